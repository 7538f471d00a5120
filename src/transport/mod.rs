//! Transport module - socket handling.
//!
//! Provides:
//! - [`Address`] - connection target (Unix socket path or `host:port`)
//! - [`Connection`] - an established duplex stream
//! - [`ChunkReader`] - the receive side, a lazy sequence of byte chunks
//! - [`ConnectionState`] - lifecycle of the client's connection

mod address;
mod connection;

pub use address::{Address, DEFAULT_SOCKET_PATH};
pub use connection::{BoxedReader, BoxedWriter, ChunkReader, Connection};

/// Connection lifecycle.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, with `Closed`
/// terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl ConnectionState {
    /// Check if moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected | Connecting | Connected, Closed)
        )
    }

    /// Check if the state is terminal.
    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn test_legal_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Closed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Closed.can_transition_to(Disconnected));
        assert!(!Closed.can_transition_to(Closed));
    }
}
