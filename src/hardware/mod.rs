//! Infrared hardware channels
//!
//! This module handles:
//! - Resolving a device's linked emitter against the hardware configuration
//! - Serializing bursts on a shared emitter (one burst per channel at a time)
//! - Handing pulse trains to the transmitter backend

mod emitter;
mod transmitter;

pub use emitter::{EmitterChannel, HardwareBus};
pub use transmitter::{LogTransmitter, Transmitter};
