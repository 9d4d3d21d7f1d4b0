//! Command execution infrastructure for a device
//!
//! This module handles:
//! - Repeating a received command as an IR burst
//! - Holding the emitter channel for the duration of the burst
//! - Mapping the codec outcome to the result topic token

mod executor;

pub use executor::{BurstReport, CommandExecutor, CommandResult};
