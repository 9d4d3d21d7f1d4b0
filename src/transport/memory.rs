//! In-process broker transport
//!
//! Records every request a session makes and lets the owner inject
//! session events, so device and registry behaviour can be driven without
//! a network broker.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use pirblaster_shared::QualityOfService;
use tokio::sync::mpsc;

use super::traits::{BrokerConnector, BrokerLink, BrokerSession, SessionEvent, SessionOptions};

/// A request recorded by a memory session
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Publish {
        topic: String,
        payload: Bytes,
        qos: QualityOfService,
        retain: bool,
    },
    Subscribe {
        topic: String,
        qos: QualityOfService,
    },
    Disconnect,
}

/// Owner-side handle of one memory session
#[derive(Clone)]
pub struct MemorySession {
    pub options: SessionOptions,
    events: mpsc::Sender<SessionEvent>,
    requests: Arc<Mutex<Vec<Request>>>,
    fail_disconnect: Arc<Mutex<bool>>,
}

impl MemorySession {
    /// Deliver an event to the session's owner
    pub async fn inject(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("Session event stream closed"))
    }

    /// Deliver a message on a topic
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.inject(SessionEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        })
        .await
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Payloads published on `topic`, in order
    pub fn published_on(&self, topic: &str) -> Vec<Bytes> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::Publish {
                    topic: t, payload, ..
                } if t == topic => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Make the next disconnect requests fail
    pub fn fail_disconnect(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_disconnect.lock() {
            *flag = fail;
        }
    }
}

struct MemoryLink {
    requests: Arc<Mutex<Vec<Request>>>,
    fail_disconnect: Arc<Mutex<bool>>,
}

impl MemoryLink {
    fn record(&self, request: Request) -> Result<()> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("Request log poisoned"))?
            .push(request);
        Ok(())
    }
}

#[async_trait]
impl BrokerLink for MemoryLink {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QualityOfService,
        retain: bool,
    ) -> Result<()> {
        self.record(Request::Publish {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            qos,
            retain,
        })
    }

    async fn subscribe(&self, topic: &str, qos: QualityOfService) -> Result<()> {
        self.record(Request::Subscribe {
            topic: topic.to_string(),
            qos,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        let fail = self.fail_disconnect.lock().map(|f| *f).unwrap_or(false);
        if fail {
            return Err(anyhow!("Broker connection closed"));
        }
        self.record(Request::Disconnect)
    }
}

/// Connector handing out memory sessions
#[derive(Default)]
pub struct MemoryConnector {
    sessions: Mutex<Vec<MemorySession>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All sessions opened so far
    pub fn sessions(&self) -> Vec<MemorySession> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent session opened for `client_id`
    pub fn session(&self, client_id: &str) -> Option<MemorySession> {
        self.sessions()
            .into_iter()
            .rev()
            .find(|s| s.options.client_id == client_id)
    }
}

impl BrokerConnector for MemoryConnector {
    fn open(&self, options: SessionOptions) -> BrokerSession {
        let (events_tx, events_rx) = mpsc::channel(options.policy.channel_capacity);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let fail_disconnect = Arc::new(Mutex::new(false));

        let session = MemorySession {
            options,
            events: events_tx,
            requests: requests.clone(),
            fail_disconnect: fail_disconnect.clone(),
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(session);
        }

        BrokerSession {
            link: Arc::new(MemoryLink {
                requests,
                fail_disconnect,
            }),
            events: events_rx,
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
