//! Payload codec for the device topics
//!
//! Command payloads are UTF-8 command labels; result payloads are one of
//! two tokens:
//! ```text
//! command: <label>
//! result:  done | unsupported
//! ```

use crate::topics;

/// Maximum accepted command payload (labels are short words)
pub const MAX_COMMAND_SIZE: usize = 256;

/// Outcome of a dispatched command as reported on the result topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Unsupported,
}

impl CommandOutcome {
    pub fn payload(self) -> &'static str {
        match self {
            CommandOutcome::Done => topics::SUCCESS_MSG,
            CommandOutcome::Unsupported => topics::ERROR_MSG,
        }
    }
}

/// Decode a command payload into a label
///
/// Invalid UTF-8 is replaced rather than rejected so that every received
/// message still produces a burst and a result. Oversized payloads are
/// truncated to `MAX_COMMAND_SIZE` bytes before decoding.
pub fn decode_command(payload: &[u8]) -> String {
    let bytes = &payload[..payload.len().min(MAX_COMMAND_SIZE)];
    String::from_utf8_lossy(bytes).trim().to_string()
}
