use async_trait::async_trait;
use parking_lot::Mutex;
use rover_core::{Command, SendFailure, SessionError};
use rover_session::CommandSink;

/// Sink that records every command and can be flipped closed.
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Command>>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    pub(crate) fn set_closed(&self, closed: bool) {
        *self.closed.lock() = closed;
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        if *self.closed.lock() {
            return Err(SendFailure::NotOpen {
                state: "closed".into(),
            }
            .into());
        }
        self.sent.lock().push(command);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !*self.closed.lock()
    }
}
