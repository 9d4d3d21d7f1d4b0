//! Device Connection State Machine
//!
//! Defines the valid broker session transitions of a device and tracks
//! the presence last announced on its status topic.

use crate::Presence;

/// Broker session state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Command topic subscription granted; the device is ready
    Subscribed,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Session start requested or reconnect attempt begun
    ConnectStarted,
    /// Broker accepted the connection
    ConnectAccepted,
    /// Broker granted the command subscription
    SubscriptionGranted,
    /// Session closed, cleanly or not
    ConnectionLost { reason: String },
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed)
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: ConnectionEvent,
    },
}

/// Connection lifecycle tracker for a device
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
    presence: Presence,
    connect_count: u32,
    last_disconnect_reason: Option<String>,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Presence last published on the status topic
    pub fn presence(&self) -> Presence {
        self.presence
    }

    /// Number of accepted connections so far
    pub fn connect_count(&self) -> u32 {
        self.connect_count
    }

    pub fn last_disconnect_reason(&self) -> Option<&str> {
        self.last_disconnect_reason.as_deref()
    }

    /// Whether the device is ready to handle commands
    pub fn is_ready(&self) -> bool {
        self.current_state == ConnectionState::Subscribed
    }

    pub fn set_presence(&mut self, presence: Presence) {
        self.presence = presence;
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ConnectionEvent) -> TransitionResult {
        if let ConnectionEvent::ConnectionLost { reason } = &event {
            self.current_state = ConnectionState::Disconnected;
            self.presence = Presence::Offline;
            self.last_disconnect_reason = Some(reason.clone());
            return TransitionResult::Success(self.current_state);
        }

        match self.get_next_state(&event) {
            Some(state) => {
                if state == ConnectionState::Connected
                    && self.current_state != ConnectionState::Connected
                {
                    self.connect_count += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self.current_state, event) {
            (Disconnected, ConnectStarted) => Some(Connecting),
            // Reconnect attempts restart from Connecting
            (Connecting, ConnectStarted) => Some(Connecting),

            (Connecting, ConnectAccepted) => Some(Connected),

            (Connected, SubscriptionGranted) => Some(Subscribed),
            // Duplicate grants (broker re-delivery) keep the device ready
            (Subscribed, SubscriptionGranted) => Some(Subscribed),

            _ => None,
        }
    }
}
