//! PirBlaster: MQTT to infrared bridge
//!
//! Every configured appliance gets its own broker session. Labels received
//! on its command topic are sent as IR bursts on the linked emitter and
//! the outcome is published on its result topic.

pub mod catalog;
pub mod command;
pub mod config;
pub mod device;
pub mod hardware;
pub mod ir;
pub mod registry;
pub mod storage;
pub mod transport;

pub use device::Device;
pub use registry::DeviceRegistry;
