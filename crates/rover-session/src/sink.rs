//! Outbound seam used by the navigator and drive loop.

use async_trait::async_trait;
use rover_core::{Command, SessionError};

/// Anything that can carry a [`Command`] to the controller.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Write one command.
    async fn send(&self, command: Command) -> Result<(), SessionError>;

    /// Whether a send right now could succeed.
    fn is_open(&self) -> bool {
        true
    }
}
