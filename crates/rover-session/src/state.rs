//! Session lifecycle states.

use std::fmt;

/// Lifecycle of one [`Session`](crate::Session).
///
/// `idle → connecting → open → closed`, plus `connecting → closed`.
/// `closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed, `start` not called yet.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Lower-case name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closed)
        )
    }

    /// `closed` never changes again.
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::{Closed, Connecting, Idle, Open};
    use super::*;

    #[test]
    fn forward_edges_allowed() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
    }

    #[test]
    fn no_backward_or_skip_edges() {
        assert!(!Idle.can_transition_to(Open));
        assert!(!Idle.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Connecting));
        for s in [Idle, Connecting, Open, Closed] {
            assert!(!Closed.can_transition_to(s));
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn only_closed_is_terminal() {
        assert!(Closed.is_terminal());
        assert!(!Open.is_terminal());
    }
}
