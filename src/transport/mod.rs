pub mod memory;
pub mod mqtt;
pub mod traits;

pub use memory::{MemoryConnector, MemorySession, Request};
pub use mqtt::{MqttConnector, MqttLink};
pub use traits::{
    BrokerConnector, BrokerLink, BrokerSession, LogSeverity, SessionEvent, SessionOptions,
    WillMessage,
};
