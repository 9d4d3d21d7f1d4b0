//! MQTT transport backed by rumqttc

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pirblaster_shared::QualityOfService;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, Notify};

use super::traits::{
    BrokerConnector, BrokerLink, BrokerSession, LogSeverity, SessionEvent, SessionOptions,
};
use crate::config::SessionPolicy;

fn to_qos(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtMostOnce => QoS::AtMostOnce,
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn from_qos(qos: QoS) -> QualityOfService {
    match qos {
        QoS::AtMostOnce => QualityOfService::AtMostOnce,
        QoS::AtLeastOnce => QualityOfService::AtLeastOnce,
        QoS::ExactlyOnce => QualityOfService::ExactlyOnce,
    }
}

/// Build client options: identity, credentials and last will
pub fn mqtt_options(options: &SessionOptions) -> MqttOptions {
    let mut mqtt = MqttOptions::new(
        options.client_id.clone(),
        options.broker.hostname.clone(),
        options.broker.port,
    );
    mqtt.set_keep_alive(options.policy.keep_alive);
    mqtt.set_clean_session(true);
    if !options.broker.user_name.is_empty() {
        mqtt.set_credentials(
            options.broker.user_name.clone(),
            options.broker.user_password.clone(),
        );
    }
    let will = &options.last_will;
    mqtt.set_last_will(LastWill::new(
        will.topic.clone(),
        will.payload.clone(),
        to_qos(will.qos),
        will.retain,
    ));
    mqtt
}

/// Connector producing rumqttc sessions
#[derive(Debug, Default)]
pub struct MqttConnector;

impl BrokerConnector for MqttConnector {
    fn open(&self, options: SessionOptions) -> BrokerSession {
        let policy = options.policy.clone();
        let (client, eventloop) = AsyncClient::new(mqtt_options(&options), policy.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(policy.channel_capacity);

        let stopping = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());

        // Spawn the session loop
        let stopping_clone = stopping.clone();
        let stop_clone = stop.clone();
        tokio::spawn(async move {
            session_loop(eventloop, policy, stopping_clone, stop_clone, event_tx).await;
        });

        BrokerSession {
            link: Arc::new(MqttLink {
                client,
                stopping,
                stop,
            }),
            events: event_rx,
        }
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}

/// Request handle of a rumqttc session
pub struct MqttLink {
    client: AsyncClient,
    stopping: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QualityOfService,
        retain: bool,
    ) -> Result<()> {
        self.client
            .publish(topic, to_qos(qos), retain, payload.to_vec())
            .await
            .with_context(|| format!("publish to {topic}"))
    }

    async fn subscribe(&self, topic: &str, qos: QualityOfService) -> Result<()> {
        self.client
            .subscribe(topic, to_qos(qos))
            .await
            .with_context(|| format!("subscribe to {topic}"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_one();
        self.client.disconnect().await.context("disconnect")
    }
}

/// Main session loop with reconnection backoff
///
/// Requests are only flushed while the event loop is polled, so a
/// connected session keeps polling until the outgoing DISCONNECT has been
/// written; an unconnected one stops as soon as a stop is requested.
async fn session_loop(
    mut eventloop: EventLoop,
    policy: SessionPolicy,
    stopping: Arc<AtomicBool>,
    stop: Arc<Notify>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let mut reconnect_delay = policy.reconnect_delay;
    let mut attempt = 1;
    let mut connected = false;

    if event_tx.send(SessionEvent::Connecting { attempt }).await.is_err() {
        return;
    }

    loop {
        let polled = if connected {
            eventloop.poll().await
        } else {
            tokio::select! {
                polled = eventloop.poll() => polled,
                _ = stop.notified() => {
                    let _ = event_tx
                        .send(SessionEvent::Disconnected {
                            reason: "stopped before connecting".into(),
                            requested: true,
                        })
                        .await;
                    return;
                }
            }
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                connected = true;
                attempt = 0;
                reconnect_delay = policy.reconnect_delay; // Reset delay
                SessionEvent::Connected {
                    session_present: ack.session_present,
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => SessionEvent::Subscribed {
                granted: ack
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => Some(from_qos(*qos)),
                        SubscribeReasonCode::Failure => None,
                    })
                    .collect(),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => SessionEvent::Message {
                topic: publish.topic,
                payload: publish.payload,
            },
            Ok(Event::Incoming(Packet::PingResp)) => SessionEvent::Log {
                severity: LogSeverity::Debug,
                message: "ping response".into(),
            },
            Ok(Event::Outgoing(Outgoing::Publish(packet_id))) => {
                SessionEvent::Published { packet_id }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = event_tx
                    .send(SessionEvent::Disconnected {
                        reason: "client disconnect".into(),
                        requested: true,
                    })
                    .await;
                return;
            }
            Ok(other) => SessionEvent::Log {
                severity: LogSeverity::Debug,
                message: format!("{other:?}"),
            },
            Err(e) => {
                connected = false;
                let requested = stopping.load(Ordering::SeqCst);
                let _ = event_tx
                    .send(SessionEvent::Disconnected {
                        reason: e.to_string(),
                        requested,
                    })
                    .await;
                if requested {
                    return;
                }

                let _ = event_tx
                    .send(SessionEvent::Log {
                        severity: LogSeverity::Notice,
                        message: format!("reconnecting in {:?}", reconnect_delay),
                    })
                    .await;

                // Wait before reconnecting
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = stop.notified() => return,
                }

                // Exponential backoff
                reconnect_delay = policy.next_delay(reconnect_delay);
                attempt += 1;
                SessionEvent::Connecting { attempt }
            }
        };

        // A stopping session keeps polling until DISCONNECT is written
        if event_tx.send(event).await.is_err() && !stopping.load(Ordering::SeqCst) {
            return;
        }
    }
}
