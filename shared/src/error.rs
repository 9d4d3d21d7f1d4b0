//! Error types shared by the registry, devices and command sets

use std::path::PathBuf;

use thiserror::Error;

use crate::DeviceId;

/// Durable storage failures (config files, devices file, assets)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed content in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot serialize content for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by a command-set codec
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Transmission failed on GPIO {gpio}: {source}")]
    Transmit {
        gpio: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while building or operating a single device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Unknown emitter '{0}' (not in hardware configuration)")]
    UnknownEmitter(String),

    #[error("Command set storage failed: {0}")]
    Asset(#[from] StorageError),

    #[error("Invalid command set name '{manufacturer}/{model}'")]
    InvalidAssetName {
        manufacturer: String,
        model: String,
    },

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Broker error: {0}")]
    Broker(String),
}

/// Failures of registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Error: Device already exists!! ({0})")]
    Conflict(DeviceId),

    #[error("Device {0} not found")]
    NotFound(DeviceId),

    #[error("Device {id}: {source}")]
    Device {
        id: DeviceId,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to stop {} device(s): {}", .0.len(), format_ids(.0))]
    StopFailed(Vec<DeviceId>),
}

fn format_ids(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
