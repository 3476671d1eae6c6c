//! Transport connection state machine.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!       ▲               │              │
//!       └───────────────┴──────────────┘
//! ```
//!
//! Transitions return `Result` so the transport can log an unexpected
//! event instead of corrupting its state.

use std::time::Instant;

use crate::error::RelayError;

/// The current state of the frame transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket and no attempt in flight.
    #[default]
    Disconnected,

    /// A connect attempt has been issued but not yet completed.
    Connecting,

    /// The socket is open and frames may arrive.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the connection has been up. `None` unless connected.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), RelayError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(RelayError::Other(format!("cannot connect while {self}"))),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), RelayError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(RelayError::Other(format!("cannot complete connect while {self}"))),
        }
    }

    /// Drop back to `Disconnected` from any state.
    ///
    /// Returns the state that was left.
    pub fn disconnect(&mut self) -> ConnectionState {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut state = ConnectionState::default();
        assert!(state.is_disconnected());

        state.begin_connect().unwrap();
        assert_eq!(state, ConnectionState::Connecting);

        state.complete_connect().unwrap();
        assert!(state.is_connected());
        assert!(state.connected_duration().is_some());

        let prev = state.disconnect();
        assert!(prev.is_connected());
        assert!(state.is_disconnected());
    }

    #[test]
    fn connect_rejected_unless_disconnected() {
        let mut state = ConnectionState::Connecting;
        assert!(state.begin_connect().is_err());
        state.complete_connect().unwrap();
        assert!(state.begin_connect().is_err());
    }

    #[test]
    fn complete_requires_connecting() {
        let mut state = ConnectionState::Disconnected;
        assert!(state.complete_connect().is_err());
        assert!(state.is_disconnected());
    }

    #[test]
    fn display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(
            ConnectionState::Connected { since: Instant::now() }.to_string(),
            "Connected"
        );
    }
}
