//! Broker transport abstraction for pluggable pub/sub backends

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use pirblaster_shared::QualityOfService;
use tokio::sync::mpsc;

use crate::config::{BrokerSettings, SessionPolicy};

/// Message the broker publishes for a client whose connection drops
#[derive(Debug, Clone, PartialEq)]
pub struct WillMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QualityOfService,
    pub retain: bool,
}

/// Everything needed to open one broker session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: String,
    pub broker: BrokerSettings,
    pub last_will: WillMessage,
    pub policy: SessionPolicy,
}

/// Closed set of transport log severities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// Events emitted by a broker session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A connection attempt started
    Connecting { attempt: u32 },
    /// Broker accepted the connection
    Connected { session_present: bool },
    /// Broker answered a subscription; `None` marks a refused topic
    Subscribed {
        granted: Vec<Option<QualityOfService>>,
    },
    /// Message received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Outgoing publish handed to the network
    Published { packet_id: u16 },
    /// Session closed; `requested` is set for client-initiated disconnects
    Disconnected { reason: String, requested: bool },
    /// Transport diagnostic
    Log {
        severity: LogSeverity,
        message: String,
    },
}

/// Client side of an open broker session
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QualityOfService,
        retain: bool,
    ) -> Result<()>;

    async fn subscribe(&self, topic: &str, qos: QualityOfService) -> Result<()>;

    /// Close the session cleanly (the will is not published)
    async fn disconnect(&self) -> Result<()>;
}

/// An opened session: request handle plus its event stream
pub struct BrokerSession {
    pub link: Arc<dyn BrokerLink>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Factory for broker sessions
pub trait BrokerConnector: Send + Sync {
    /// Open a session and start driving it; must run inside a tokio runtime
    fn open(&self, options: SessionOptions) -> BrokerSession;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
