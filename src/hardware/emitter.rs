//! Emitter channels and the hardware bus that owns them

use std::io;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use super::Transmitter;
use crate::config::HardwareConfig;

/// One IR output channel
///
/// Several devices may be linked to the same channel; the channel token
/// must be held for a whole burst so bursts never interleave on the wire.
pub struct EmitterChannel {
    name: String,
    gpio: u32,
    transmitter: Arc<dyn Transmitter>,
    token: Mutex<()>,
}

impl EmitterChannel {
    pub fn new(name: impl Into<String>, gpio: u32, transmitter: Arc<dyn Transmitter>) -> Self {
        Self {
            name: name.into(),
            gpio,
            transmitter,
            token: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    /// Wait for exclusive use of the channel
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.token.lock().await
    }

    /// Send one pulse train on this channel's GPIO
    pub fn transmit(&self, pulses: &[u32]) -> io::Result<()> {
        self.transmitter.transmit(self.gpio, pulses)
    }
}

impl std::fmt::Debug for EmitterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterChannel")
            .field("name", &self.name)
            .field("gpio", &self.gpio)
            .field("transmitter", &self.transmitter.name())
            .finish()
    }
}

/// All output channels declared in the hardware configuration
#[derive(Debug, Default)]
pub struct HardwareBus {
    channels: Vec<Arc<EmitterChannel>>,
}

impl HardwareBus {
    pub fn new(config: &HardwareConfig, transmitter: Arc<dyn Transmitter>) -> Self {
        let channels = config
            .outputs
            .iter()
            .map(|out| {
                info!("Emitter {} on GPIO {}", out.name, out.gpio_id);
                Arc::new(EmitterChannel::new(
                    &out.name,
                    out.gpio_id,
                    transmitter.clone(),
                ))
            })
            .collect();
        Self { channels }
    }

    /// Find the channel a device's `linkedEmitter` refers to
    pub fn resolve(&self, name: &str) -> Option<Arc<EmitterChannel>> {
        self.channels.iter().find(|c| c.name == name).cloned()
    }
}
