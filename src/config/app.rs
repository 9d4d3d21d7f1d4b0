//! Broker and hardware configuration files

use std::path::{Path, PathBuf};

use pirblaster_shared::StorageError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::storage::{read_json, write_json_atomic};

pub const MQTT_CONFIG_FILE: &str = "mqtt.json";
pub const HW_CONFIG_FILE: &str = "hardware.json";

/// Contents of `mqtt.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: BrokerAddress,
    pub user: UserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerAddress {
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
}

/// Contents of `hardware.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(rename = "in")]
    pub input: PinConfig,
    #[serde(rename = "out")]
    pub outputs: Vec<PinConfig>,
}

/// A named GPIO channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinConfig {
    pub name: String,
    pub gpio_id: u32,
}

/// Broker connection data handed to each device at construction
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub hostname: String,
    pub port: u16,
    pub user_name: String,
    pub user_password: String,
}

/// Application configuration backed by a configuration directory
#[derive(Debug, Clone)]
pub struct AppConfig {
    dir: PathBuf,
    mqtt: MqttConfig,
    hardware: HardwareConfig,
}

impl AppConfig {
    /// Load `mqtt.json` and `hardware.json` from `dir`
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();

        info!("Opening MQTT configuration");
        let mqtt = read_json(&dir.join(MQTT_CONFIG_FILE))?;

        info!("Opening hardware configuration");
        let hardware = read_json(&dir.join(HW_CONFIG_FILE))?;

        Ok(Self { dir, mqtt, hardware })
    }

    /// Build a configuration in memory (saved on demand into `dir`)
    pub fn new(dir: impl Into<PathBuf>, mqtt: MqttConfig, hardware: HardwareConfig) -> Self {
        Self {
            dir: dir.into(),
            mqtt,
            hardware,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            hostname: self.mqtt.broker.hostname.clone(),
            port: self.mqtt.broker.port,
            user_name: self.mqtt.user.name.clone(),
            user_password: self.mqtt.user.password.clone(),
        }
    }

    pub fn hardware(&self) -> &HardwareConfig {
        &self.hardware
    }

    pub fn broker_hostname(&self) -> &str {
        &self.mqtt.broker.hostname
    }

    pub fn set_broker_hostname(&mut self, hostname: impl Into<String>) {
        self.mqtt.broker.hostname = hostname.into();
    }

    pub fn broker_port(&self) -> u16 {
        self.mqtt.broker.port
    }

    pub fn set_broker_port(&mut self, port: u16) {
        self.mqtt.broker.port = port;
    }

    pub fn user_name(&self) -> &str {
        &self.mqtt.user.name
    }

    pub fn set_user_name(&mut self, name: impl Into<String>) {
        self.mqtt.user.name = name.into();
    }

    pub fn user_password(&self) -> &str {
        &self.mqtt.user.password
    }

    pub fn set_user_password(&mut self, password: impl Into<String>) {
        self.mqtt.user.password = password.into();
    }

    /// Persist the broker configuration
    pub fn save_mqtt(&self) -> Result<(), StorageError> {
        info!("Saving MQTT configuration");
        write_json_atomic(&self.dir.join(MQTT_CONFIG_FILE), &self.mqtt)
            .inspect_err(|e| error!("Error accessing MQTT configuration file: {}", e))
    }

    pub fn input_name(&self) -> &str {
        &self.hardware.input.name
    }

    pub fn input_gpio(&self) -> u32 {
        self.hardware.input.gpio_id
    }

    pub fn set_input_gpio(&mut self, gpio_id: u32) {
        self.hardware.input.gpio_id = gpio_id;
    }

    pub fn output_count(&self) -> usize {
        self.hardware.outputs.len()
    }

    pub fn output_name(&self, index: usize) -> Option<&str> {
        self.hardware.outputs.get(index).map(|o| o.name.as_str())
    }

    pub fn output_gpio(&self, index: usize) -> Option<u32> {
        self.hardware.outputs.get(index).map(|o| o.gpio_id)
    }

    /// Returns false when `index` is out of range
    pub fn set_output_gpio(&mut self, index: usize, gpio_id: u32) -> bool {
        match self.hardware.outputs.get_mut(index) {
            Some(output) => {
                output.gpio_id = gpio_id;
                true
            }
            None => false,
        }
    }

    /// Persist the hardware configuration
    pub fn save_hardware(&self) -> Result<(), StorageError> {
        info!("Saving hardware configuration");
        write_json_atomic(&self.dir.join(HW_CONFIG_FILE), &self.hardware)
            .inspect_err(|e| error!("Error accessing hardware configuration file: {}", e))
    }
}
