//! Session event handling and command dispatch for a running device

use std::sync::Arc;
use std::time::Duration;

use pirblaster_shared::codec::decode_command;
use pirblaster_shared::state_machine::{
    ConnectionEvent, ConnectionStateMachine, TransitionResult,
};
use pirblaster_shared::{DeviceTopics, Presence, QualityOfService};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::command::{BurstReport, CommandExecutor};
use crate::ir::CommandSet;
use crate::transport::{BrokerLink, LogSeverity, SessionEvent};

/// Presence announcements always use at-least-once, retained
const PRESENCE_QOS: QualityOfService = QualityOfService::AtLeastOnce;
const COMMAND_QOS: QualityOfService = QualityOfService::AtMostOnce;
const RESULT_QOS: QualityOfService = QualityOfService::AtMostOnce;

/// Emitter and pacing for the next burst, replaceable while running
#[derive(Clone)]
pub(super) struct DispatchTarget {
    pub executor: Arc<CommandExecutor>,
    pub gap: Duration,
}

/// State shared by the session and dispatch tasks of one device
pub(super) struct SessionContext {
    pub scope: String,
    pub topics: DeviceTopics,
    pub link: Arc<dyn BrokerLink>,
    pub state: Arc<RwLock<ConnectionStateMachine>>,
    pub commands: Arc<Mutex<CommandSet>>,
    pub dispatch: Arc<RwLock<DispatchTarget>>,
    pub last_burst: Arc<RwLock<Option<BurstReport>>>,
}

impl SessionContext {
    pub async fn transition(&self, event: ConnectionEvent) {
        let mut fsm = self.state.write().await;
        let from = fsm.state();
        match fsm.process_event(event) {
            TransitionResult::Success(to) if from != to => {
                debug!("[{}] State: {:?} -> {:?}", self.scope, from, to);
            }
            TransitionResult::Success(_) => {}
            TransitionResult::Invalid { from, event } => {
                warn!("[{}] Ignored {:?} in state {:?}", self.scope, event, from);
            }
        }
    }

    async fn announce_online(&self) {
        let payload = Presence::Online.payload();
        match self
            .link
            .publish(&self.topics.status, payload.as_bytes(), PRESENCE_QOS, true)
            .await
        {
            Ok(()) => self.state.write().await.set_presence(Presence::Online),
            Err(e) => error!("[{}] Failed to publish presence: {:#}", self.scope, e),
        }
    }
}

/// Handle events of one broker session until its stream ends
pub(super) async fn run_session(
    ctx: Arc<SessionContext>,
    mut events: mpsc::Receiver<SessionEvent>,
    dispatch_tx: mpsc::Sender<String>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connecting { attempt } => {
                debug!("[{}] Connecting (attempt {})", ctx.scope, attempt);
                ctx.transition(ConnectionEvent::ConnectStarted).await;
            }
            SessionEvent::Connected { session_present } => {
                info!("[{}] Connected", ctx.scope);
                debug!("[{}] session_present {}", ctx.scope, session_present);
                ctx.transition(ConnectionEvent::ConnectAccepted).await;

                ctx.announce_online().await;

                if let Err(e) = ctx.link.subscribe(&ctx.topics.command, COMMAND_QOS).await {
                    error!("[{}] Failed to subscribe: {:#}", ctx.scope, e);
                }
            }
            SessionEvent::Subscribed { granted } => {
                if granted.iter().all(Option::is_some) {
                    info!("[{}] Subscribed with QoS {:?}", ctx.scope, granted);
                    ctx.transition(ConnectionEvent::SubscriptionGranted).await;
                } else {
                    error!("[{}] Broker refused command subscription", ctx.scope);
                }
            }
            SessionEvent::Message { topic, payload } => {
                if topic != ctx.topics.command {
                    debug!("[{}] Ignoring message on {}", ctx.scope, topic);
                    continue;
                }
                let label = decode_command(&payload);
                info!("[{}] Message received {}", ctx.scope, label);
                if dispatch_tx.send(label).await.is_err() {
                    error!("[{}] Dispatcher stopped", ctx.scope);
                    break;
                }
            }
            SessionEvent::Published { packet_id } => {
                debug!("[{}] Message published, mid {}", ctx.scope, packet_id);
            }
            SessionEvent::Disconnected { reason, requested } => {
                if requested {
                    info!("[{}] Disconnected", ctx.scope);
                } else {
                    warn!("[{}] Disconnected: {}", ctx.scope, reason);
                }
                ctx.transition(ConnectionEvent::ConnectionLost { reason }).await;
            }
            SessionEvent::Log { severity, message } => {
                log_transport(&ctx.scope, severity, &message);
            }
        }
    }

    debug!("[{}] Session event stream closed", ctx.scope);
}

/// Run bursts one at a time, in arrival order
pub(super) async fn run_dispatch(ctx: Arc<SessionContext>, mut labels: mpsc::Receiver<String>) {
    while let Some(label) = labels.recv().await {
        let target = ctx.dispatch.read().await.clone();
        let report = {
            let commands = ctx.commands.lock().await;
            target.executor.execute(&*commands, &label, target.gap).await
        };

        let outcome = report.result.outcome();
        if let Err(e) = ctx
            .link
            .publish(&ctx.topics.result, outcome.payload().as_bytes(), RESULT_QOS, false)
            .await
        {
            error!("[{}] Failed to publish result: {:#}", ctx.scope, e);
        }

        *ctx.last_burst.write().await = Some(report);
    }
}

fn log_transport(scope: &str, severity: LogSeverity, message: &str) {
    match severity {
        LogSeverity::Debug => debug!("[{}] {}", scope, message),
        LogSeverity::Info | LogSeverity::Notice => info!("[{}] {}", scope, message),
        LogSeverity::Warning => warn!("[{}] {}", scope, message),
        LogSeverity::Error => error!("[{}] {}", scope, message),
    }
}
