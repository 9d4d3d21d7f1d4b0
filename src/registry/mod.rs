//! Device registry
//!
//! Owns the ordered set of devices for the process: construction from the
//! devices file, identity-unique insertion and removal, bulk start/stop,
//! persistence and asset discovery.

mod manager;

pub use manager::DeviceRegistry;

/// Default devices file name inside the configuration directory
pub const DEVICES_FILE: &str = "devices.json";
