//! Broker session policy

use std::time::Duration;

/// Keep-alive and reconnection behaviour shared by all device sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Capacity of the client request and event channels
    pub channel_capacity: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            channel_capacity: 100,
        }
    }
}

impl SessionPolicy {
    /// Exponential backoff step, capped at `max_reconnect_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max_reconnect_delay)
    }
}
