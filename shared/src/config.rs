//! Persisted device configuration records
//!
//! One JSON object per device, stored as an array in the devices file:
//! ```text
//! { name, location, linkedEmitter,
//!   commandSet: { model, manufacturer, description, emitterGpio, receiverGpio, packetGap },
//!   topicPrefix, lastWill: { qos, retain } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DeviceId, DeviceTopics, QualityOfService};

/// Configuration of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub name: String,
    pub location: String,
    /// Name of the hardware output channel this device transmits on
    pub linked_emitter: String,
    pub command_set: CommandSetConfig,
    pub topic_prefix: String,
    pub last_will: LastWillConfig,
}

/// Command set reference (existing asset) and parameters for a new one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSetConfig {
    pub model: String,
    pub manufacturer: String,
    pub description: String,
    pub emitter_gpio: u32,
    pub receiver_gpio: u32,
    /// Inter-packet gap in seconds
    pub packet_gap: f64,
}

/// Policy of the `OFFLINE` presence message left with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWillConfig {
    pub qos: QualityOfService,
    pub retain: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "myDevice".into(),
            location: "myDevLocation".into(),
            linked_emitter: "OUT0".into(),
            command_set: CommandSetConfig::default(),
            topic_prefix: "myDevPrefix".into(),
            last_will: LastWillConfig::default(),
        }
    }
}

impl Default for CommandSetConfig {
    fn default() -> Self {
        Self {
            model: "rm-s103".into(),
            manufacturer: "sony".into(),
            description: "My Device Description".into(),
            emitter_gpio: 22,
            receiver_gpio: 11,
            packet_gap: 0.01,
        }
    }
}

impl Default for LastWillConfig {
    fn default() -> Self {
        Self {
            qos: QualityOfService::AtLeastOnce,
            retain: true,
        }
    }
}

impl DeviceConfig {
    pub fn id(&self) -> DeviceId {
        DeviceId::new(&self.name, &self.location)
    }

    pub fn topics(&self) -> DeviceTopics {
        DeviceTopics::new(&self.topic_prefix, &self.id())
    }
}

impl CommandSetConfig {
    /// Inter-packet gap; negative or non-finite values collapse to zero
    pub fn gap(&self) -> Duration {
        Duration::try_from_secs_f64(self.packet_gap).unwrap_or(Duration::ZERO)
    }
}
