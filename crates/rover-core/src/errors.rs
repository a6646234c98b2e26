//! Error types for the rover link.
//!
//! - [`CodecError`]: a frame could not be encoded or decoded
//! - [`SessionError`]: connection lifecycle and send failures
//! - [`SendFailure`]: why a single outbound frame did not go out
//! - [`ObserverError`]: an inbound-message handler reported failure

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// CodecError
// ─────────────────────────────────────────────────────────────────────────────

/// JSON framing failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The value cannot be represented on the wire.
    #[error("encoding failed: {message}")]
    Encoding {
        /// What went wrong.
        message: String,
    },

    /// The frame is not valid JSON or does not match the expected shape.
    #[error("decoding failed: {message}")]
    Decoding {
        /// What went wrong.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionError
// ─────────────────────────────────────────────────────────────────────────────

/// Why an outbound frame was not written.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendFailure {
    /// The session is not in the `open` state.
    #[error("session is {state}")]
    NotOpen {
        /// State observed at the time of the call.
        state: String,
    },

    /// The session was stopped while the write was in flight.
    #[error("interrupted by stop")]
    Interrupted,

    /// The underlying socket rejected the write.
    #[error("transport: {0}")]
    Transport(String),
}

/// Connection lifecycle failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Could not open (or keep open) the connection.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect {
        /// `ws://host:port` that was dialled.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// Outbound frame not written.
    #[error("send failed: {0}")]
    Send(#[from] SendFailure),

    /// Operation not valid in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State at the time of the call.
        state: String,
    },
}

impl SessionError {
    /// Whether the error means the link is gone for good.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::Send(SendFailure::NotOpen { state }) => state == "closed",
            Self::Send(SendFailure::Interrupted | SendFailure::Transport(_)) => true,
            Self::InvalidState { .. } => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ObserverError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a message observer. Logged, never propagated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ObserverError {
    /// Human-readable description.
    pub message: String,
}

impl ObserverError {
    /// Create an observer error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<SessionError> for ObserverError {
    fn from(err: SessionError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display() {
        assert_eq!(
            CodecError::decoding("expected value at line 1").to_string(),
            "decoding failed: expected value at line 1"
        );
        assert_eq!(
            CodecError::encoding("x is not finite").to_string(),
            "encoding failed: x is not finite"
        );
    }

    #[test]
    fn connect_error_display() {
        let err = SessionError::Connect {
            endpoint: "ws://192.168.4.1:81".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "connect to ws://192.168.4.1:81 failed: connection refused"
        );
        assert!(err.is_closed());
    }

    #[test]
    fn send_error_wraps_failure() {
        let err: SessionError = SendFailure::NotOpen {
            state: "connecting".into(),
        }
        .into();
        assert_eq!(err.to_string(), "send failed: session is connecting");
        assert!(!err.is_closed());

        let err: SessionError = SendFailure::NotOpen {
            state: "closed".into(),
        }
        .into();
        assert!(err.is_closed());
    }

    #[test]
    fn invalid_state_display() {
        let err = SessionError::InvalidState {
            operation: "start",
            state: "open".into(),
        };
        assert_eq!(err.to_string(), "cannot start while open");
        assert!(!err.is_closed());
    }

    #[test]
    fn observer_error_from_session_error() {
        let err: ObserverError = SessionError::Send(SendFailure::Interrupted).into();
        assert_eq!(err.message, "send failed: interrupted by stop");
    }
}
