//! PirBlaster Shared Types
//!
//! This crate provides the wire-level vocabulary shared by the bridge and
//! any control surface: topic layout, payload tokens, persisted device
//! configuration records and the per-device connection state machine.

pub mod codec;
pub mod config;
pub mod error;
pub mod state_machine;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use config::{CommandSetConfig, DeviceConfig, LastWillConfig};
pub use error::{CodecError, DeviceError, RegistryError, StorageError};

/// Dispatch parameters for infrared bursts
pub mod dispatch {
    /// Number of transmissions issued for every received command
    pub const BURST_REPETITIONS: u32 = 4;
}

/// Topic suffixes and payload tokens
pub mod topics {
    pub const STATUS_TOPIC: &str = "status";
    pub const COMMAND_TOPIC: &str = "command";
    pub const RESULT_TOPIC: &str = "result";

    pub const ONLINE_MSG: &str = "ONLINE";
    pub const OFFLINE_MSG: &str = "OFFLINE";
    pub const SUCCESS_MSG: &str = "done";
    pub const ERROR_MSG: &str = "unsupported";
}

/// Broker delivery guarantee for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QualityOfService {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QualityOfService {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(format!("invalid QoS level {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<QualityOfService> for u8 {
    fn from(qos: QualityOfService) -> Self {
        match qos {
            QualityOfService::AtMostOnce => 0,
            QualityOfService::AtLeastOnce => 1,
            QualityOfService::ExactlyOnce => 2,
        }
    }
}

/// Unique identity of a device: (name, location)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub name: String,
    pub location: String,
}

impl DeviceId {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }

    pub fn matches(&self, name: &str, location: &str) -> bool {
        self.name == name && self.location == location
    }
}

/// Renders as `location.name`, the broker client id and log scope
impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.location, self.name)
    }
}

/// Fully resolved topics of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub status: String,
    pub command: String,
    pub result: String,
}

impl DeviceTopics {
    /// Build topics under `<prefix>/<location>/<name>/`
    pub fn new(prefix: &str, id: &DeviceId) -> Self {
        let base = format!("{}/{}/{}/", prefix, id.location, id.name);
        Self {
            status: format!("{base}{}", topics::STATUS_TOPIC),
            command: format!("{base}{}", topics::COMMAND_TOPIC),
            result: format!("{base}{}", topics::RESULT_TOPIC),
        }
    }
}

/// Presence published on the status topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    Online,
    #[default]
    Offline,
}

impl Presence {
    pub fn payload(self) -> &'static str {
        match self {
            Presence::Online => topics::ONLINE_MSG,
            Presence::Offline => topics::OFFLINE_MSG,
        }
    }
}

/// Outcome of one administrative operation, in the shape a control
/// surface hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            result: "success".into(),
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: "failed".into(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for OperationReport {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self {
                result: "success".into(),
                message: None,
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
