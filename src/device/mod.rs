//! Devices: one broker session per IR-controlled appliance
//!
//! This module handles:
//! - Building a device from its configuration (command set, emitter, will)
//! - Driving the broker session (presence, command subscription)
//! - Serialized dispatch of received commands as IR bursts
//! - Administrative command-set edits and persistence

mod bridge;
mod events;

pub use bridge::Device;

use std::sync::Arc;

use crate::catalog::AssetCatalog;
use crate::config::{BrokerSettings, SessionPolicy};
use crate::hardware::HardwareBus;
use crate::transport::BrokerConnector;

/// Where a device's command set comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSetSource {
    /// Load `<manufacturer>/<model>.json` from the catalog
    Load,
    /// Start an empty command set from the configured parameters
    Create,
}

/// Collaborators a device is built against
#[derive(Clone)]
pub struct DeviceContext {
    pub broker: BrokerSettings,
    pub policy: SessionPolicy,
    pub hardware: Arc<HardwareBus>,
    pub catalog: AssetCatalog,
    pub connector: Arc<dyn BrokerConnector>,
}
