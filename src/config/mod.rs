//! Application configuration
//!
//! This module handles:
//! - Broker address and credentials (`mqtt.json`)
//! - Hardware pin mapping (`hardware.json`)
//! - Broker session policy (keep-alive, reconnect backoff)

mod app;
mod session;

pub use app::{
    AppConfig, BrokerAddress, BrokerSettings, HardwareConfig, MqttConfig, PinConfig, UserConfig,
    HW_CONFIG_FILE, MQTT_CONFIG_FILE,
};
pub use session::SessionPolicy;
