//! # Connection State
//!
//! The single state value owned by the connection manager, with its
//! transition table.
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | Idle | Scanning | `start` |
//! | Scanning | Connecting | matching peripheral found |
//! | Scanning | Idle | `stop` |
//! | Connecting | Connected | link established and subscribed |
//! | Connecting | Scanning | connect/subscribe failure or timeout |
//! | Connecting | Idle | `stop` |
//! | Connected | Disconnecting | link lost or `stop` |
//! | Disconnecting | Scanning | link lost (auto-reconnect) |
//! | Disconnecting | Idle | `stop` |

use std::fmt;

/// Lifecycle of the link to the transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not trying to connect
    #[default]
    Idle,
    /// Looking for the transmitter
    Scanning,
    /// Establishing the link and subscribing
    Connecting,
    /// Receiving notifications
    Connected,
    /// Releasing the link
    Disconnecting,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Connecting)
                | (Scanning, Idle)
                | (Connecting, Connected)
                | (Connecting, Scanning)
                | (Connecting, Idle)
                | (Connected, Disconnecting)
                | (Disconnecting, Scanning)
                | (Disconnecting, Idle)
        )
    }

    /// Whether the manager is doing anything other than waiting for `start`.
    pub fn is_active(self) -> bool {
        self != ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}
