//! Infrared command-set codec
//!
//! A command set maps command labels to pulse trains. The `Codec` trait is
//! the boundary the dispatcher talks to; `CommandSet` is the JSON-backed
//! implementation stored in the asset catalog.

mod command_set;

pub use command_set::{CommandSet, IrCommand};

use std::path::Path;

use pirblaster_shared::{CodecError, StorageError};

use crate::hardware::EmitterChannel;

/// Command-set codec operations
pub trait Codec: Send + Sync {
    /// Transmit one packet of the named command on `channel`
    fn emit(&self, label: &str, channel: &EmitterChannel) -> Result<(), CodecError>;

    /// Insert or replace a command
    fn add_command(&mut self, label: &str, command: IrCommand);

    /// Remove a command, returning it when it existed
    fn remove_command(&mut self, label: &str) -> Option<IrCommand>;

    /// Persist the command set at `path`
    fn save(&self, path: &Path) -> Result<(), StorageError>;
}
