//! JSON-backed command set
//!
//! Asset layout:
//! ```text
//! { "description": "...", "emitterGpio": 22, "receiverGpio": 11,
//!   "commands": { "<label>": { "description": "...", "pulses": [mark, space, ...] } } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use pirblaster_shared::{CodecError, CommandSetConfig, StorageError};
use serde::{Deserialize, Serialize};

use super::Codec;
use crate::hardware::EmitterChannel;
use crate::storage::{read_json, write_json_atomic};

/// One learned IR command
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IrCommand {
    #[serde(default)]
    pub description: String,
    /// Alternating mark/space durations in microseconds
    pub pulses: Vec<u32>,
}

impl IrCommand {
    pub fn new(description: impl Into<String>, pulses: Vec<u32>) -> Self {
        Self {
            description: description.into(),
            pulses,
        }
    }
}

/// Named collection of IR commands for one manufacturer/model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSet {
    #[serde(default)]
    pub description: String,
    pub emitter_gpio: u32,
    pub receiver_gpio: u32,
    #[serde(default)]
    commands: BTreeMap<String, IrCommand>,
}

impl CommandSet {
    /// New, empty command set
    pub fn new(emitter_gpio: u32, receiver_gpio: u32, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            emitter_gpio,
            receiver_gpio,
            commands: BTreeMap::new(),
        }
    }

    /// Empty command set built from device parameters
    pub fn from_config(config: &CommandSetConfig) -> Self {
        Self::new(
            config.emitter_gpio,
            config.receiver_gpio,
            config.description.clone(),
        )
    }

    /// Load an asset file
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        read_json(path)
    }

    pub fn get(&self, label: &str) -> Option<&IrCommand> {
        self.commands.get(label)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// JSON view handed to control surfaces
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Codec for CommandSet {
    fn emit(&self, label: &str, channel: &EmitterChannel) -> Result<(), CodecError> {
        let command = self
            .commands
            .get(label)
            .ok_or_else(|| CodecError::UnsupportedCommand(label.to_string()))?;

        channel
            .transmit(&command.pulses)
            .map_err(|source| CodecError::Transmit {
                gpio: channel.gpio(),
                source,
            })
    }

    fn add_command(&mut self, label: &str, command: IrCommand) {
        self.commands.insert(label.to_string(), command);
    }

    fn remove_command(&mut self, label: &str) -> Option<IrCommand> {
        self.commands.remove(label)
    }

    fn save(&self, path: &Path) -> Result<(), StorageError> {
        write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Transmitter;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTransmitter {
        sent: Mutex<Vec<(u32, Vec<u32>)>>,
    }

    impl Transmitter for RecordingTransmitter {
        fn transmit(&self, gpio: u32, pulses: &[u32]) -> io::Result<()> {
            self.sent.lock().unwrap().push((gpio, pulses.to_vec()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct BrokenTransmitter;

    impl Transmitter for BrokenTransmitter {
        fn transmit(&self, _gpio: u32, _pulses: &[u32]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "gpio busy"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn tv_set() -> CommandSet {
        let mut set = CommandSet::new(22, 11, "Living room TV");
        set.add_command("power", IrCommand::new("Power toggle", vec![2400, 600, 1200, 600]));
        set
    }

    #[test]
    fn test_emit_known_command() {
        let tx = Arc::new(RecordingTransmitter::default());
        let channel = EmitterChannel::new("OUT0", 22, tx.clone());

        tv_set().emit("power", &channel).unwrap();

        let sent = tx.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (22, vec![2400, 600, 1200, 600]));
    }

    #[test]
    fn test_emit_unknown_command() {
        let tx = Arc::new(RecordingTransmitter::default());
        let channel = EmitterChannel::new("OUT0", 22, tx.clone());

        let result = tv_set().emit("mute", &channel);
        assert!(matches!(result, Err(CodecError::UnsupportedCommand(ref l)) if l == "mute"));
        assert!(tx.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_emit_transmit_failure() {
        let channel = EmitterChannel::new("OUT0", 22, Arc::new(BrokenTransmitter));
        let result = tv_set().emit("power", &channel);
        assert!(matches!(result, Err(CodecError::Transmit { gpio: 22, .. })));
    }

    #[test]
    fn test_add_remove() {
        let mut set = tv_set();
        set.add_command("mute", IrCommand::new("", vec![600, 600]));
        assert_eq!(set.len(), 2);
        assert!(set.get("mute").is_some());

        assert!(set.remove_command("mute").is_some());
        assert!(set.remove_command("mute").is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sony").join("rm-s103.json");

        let set = tv_set();
        set.save(&path).unwrap();

        let loaded = CommandSet::load(&path).unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.to_json()["commands"]["power"]["pulses"][0], 2400);
    }

    #[test]
    fn test_from_config_is_empty() {
        let set = CommandSet::from_config(&CommandSetConfig::default());
        assert!(set.is_empty());
        assert_eq!(set.emitter_gpio, 22);
        assert_eq!(set.receiver_gpio, 11);
        assert_eq!(set.description, "My Device Description");
    }
}
