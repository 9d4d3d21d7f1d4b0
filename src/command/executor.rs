//! Burst executor - repeats a command on the linked emitter

use std::sync::Arc;
use std::time::Duration;

use pirblaster_shared::codec::CommandOutcome;
use pirblaster_shared::{dispatch, CodecError, DeviceId};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::hardware::EmitterChannel;
use crate::ir::Codec;

/// Result of one burst
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Every packet was handed to the emitter
    Completed,
    /// The command set has no such label
    Unsupported,
    /// The emitter refused at least one packet
    Failed { message: String },
}

impl CommandResult {
    /// Token published on the result topic
    pub fn outcome(&self) -> CommandOutcome {
        match self {
            CommandResult::Completed => CommandOutcome::Done,
            CommandResult::Unsupported | CommandResult::Failed { .. } => {
                CommandOutcome::Unsupported
            }
        }
    }
}

/// Report of an executed burst
#[derive(Debug, Clone)]
pub struct BurstReport {
    pub label: String,
    pub attempts: u32,
    pub result: CommandResult,
    pub elapsed: Duration,
}

/// Executes command bursts for one device
pub struct CommandExecutor {
    device_id: DeviceId,
    channel: Arc<EmitterChannel>,
    repetitions: u32,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(device_id: DeviceId, channel: Arc<EmitterChannel>) -> Self {
        Self {
            device_id,
            channel,
            repetitions: dispatch::BURST_REPETITIONS,
        }
    }

    /// Transmit `label` `repetitions` times, `gap` apart
    ///
    /// The emitter channel is held for the whole burst. Every attempt is
    /// made even when the label is unknown; there is no acknowledgment
    /// from the receiver to stop on.
    pub async fn execute<C: Codec + ?Sized>(&self, codec: &C, label: &str, gap: Duration) -> BurstReport {
        let start_time = Instant::now();

        info!("[{}] Executing command: {}", self.device_id, label);

        let _token = self.channel.acquire().await;

        let mut result = CommandResult::Completed;
        for attempt in 0..self.repetitions {
            debug!("[{}] Sending packet #{}", self.device_id, attempt);

            match codec.emit(label, &self.channel) {
                Ok(()) => {}
                Err(CodecError::UnsupportedCommand(_)) => {
                    result = CommandResult::Unsupported;
                }
                Err(e) => {
                    error!("[{}] Packet #{} failed: {}", self.device_id, attempt, e);
                    if !matches!(result, CommandResult::Unsupported) {
                        result = CommandResult::Failed {
                            message: e.to_string(),
                        };
                    }
                }
            }

            if attempt + 1 < self.repetitions && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
        }

        let elapsed = start_time.elapsed();

        match &result {
            CommandResult::Completed => info!("[{}] Command sent", self.device_id),
            CommandResult::Unsupported => {
                warn!("[{}] Command unsupported: {}", self.device_id, label)
            }
            CommandResult::Failed { message } => {
                error!("[{}] Command failed: {}", self.device_id, message)
            }
        }

        BurstReport {
            label: label.to_string(),
            attempts: self.repetitions,
            result,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::LogTransmitter;
    use crate::ir::IrCommand;
    use pirblaster_shared::StorageError;
    use std::path::Path;
    use std::sync::Mutex;

    /// Codec that records when each emit happened
    #[derive(Default)]
    struct ScriptedCodec {
        known: Vec<String>,
        emits: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedCodec {
        fn knowing(labels: &[&str]) -> Self {
            Self {
                known: labels.iter().map(|l| l.to_string()).collect(),
                emits: Mutex::new(Vec::new()),
            }
        }

        fn emit_times(&self) -> Vec<Instant> {
            self.emits.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    impl Codec for ScriptedCodec {
        fn emit(&self, label: &str, _channel: &EmitterChannel) -> Result<(), CodecError> {
            self.emits
                .lock()
                .unwrap()
                .push((label.to_string(), Instant::now()));
            if self.known.iter().any(|l| l == label) {
                Ok(())
            } else {
                Err(CodecError::UnsupportedCommand(label.to_string()))
            }
        }

        fn add_command(&mut self, label: &str, _command: IrCommand) {
            self.known.push(label.to_string());
        }

        fn remove_command(&mut self, _label: &str) -> Option<IrCommand> {
            None
        }

        fn save(&self, _path: &Path) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn executor() -> CommandExecutor {
        let channel = Arc::new(EmitterChannel::new("OUT0", 22, Arc::new(LogTransmitter)));
        CommandExecutor::new(DeviceId::new("tv", "livingroom"), channel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_four_packets_gap_apart() {
        let codec = ScriptedCodec::knowing(&["power"]);
        let gap = Duration::from_millis(10);

        let report = executor().execute(&codec, "power", gap).await;

        assert_eq!(report.result, CommandResult::Completed);
        assert_eq!(report.attempts, 4);

        let times = codec.emit_times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], gap);
        }
        assert_eq!(report.elapsed, gap * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_label_still_bursts() {
        let codec = ScriptedCodec::knowing(&["power"]);

        let report = executor()
            .execute(&codec, "mute", Duration::from_millis(10))
            .await;

        assert_eq!(report.result, CommandResult::Unsupported);
        assert_eq!(report.result.outcome(), CommandOutcome::Unsupported);
        assert_eq!(codec.emit_times().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_on_shared_channel_do_not_interleave() {
        let channel = Arc::new(EmitterChannel::new("OUT0", 22, Arc::new(LogTransmitter)));
        let tv = CommandExecutor::new(DeviceId::new("tv", "livingroom"), channel.clone());
        let fan = CommandExecutor::new(DeviceId::new("fan", "livingroom"), channel);

        let codec = ScriptedCodec::knowing(&["power", "speed"]);
        let gap = Duration::from_millis(10);

        tokio::join!(
            tv.execute(&codec, "power", gap),
            fan.execute(&codec, "speed", gap)
        );

        let labels: Vec<String> = codec
            .emits
            .lock()
            .unwrap()
            .iter()
            .map(|(l, _)| l.clone())
            .collect();
        assert_eq!(labels.len(), 8);
        assert!(labels[..4].iter().all(|l| l == &labels[0]));
        assert!(labels[4..].iter().all(|l| l == &labels[4]));
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(CommandResult::Completed.outcome(), CommandOutcome::Done);
        let failed = CommandResult::Failed {
            message: "gpio busy".into(),
        };
        assert_eq!(failed.outcome(), CommandOutcome::Unsupported);
    }
}
