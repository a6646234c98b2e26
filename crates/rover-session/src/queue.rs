//! Unbounded FIFO between the receive loop and the processor.
//!
//! The producer never waits on the consumer. End-of-stream is seen by the
//! receiver only after every sender is dropped and the buffer is drained.

use rover_core::Telemetry;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Constructor for the sender/receiver pair.
pub struct InboundQueue;

impl InboundQueue {
    /// Create a connected pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (InboundSender, InboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InboundSender { tx }, InboundReceiver { rx })
    }
}

/// Producer half. Cheap to clone.
#[derive(Clone, Debug)]
pub struct InboundSender {
    tx: UnboundedSender<Telemetry>,
}

/// Error returned when the receiver has been dropped.
#[derive(Debug)]
pub struct ReceiverGone(pub Telemetry);

impl InboundSender {
    /// Enqueue without waiting.
    pub fn push(&self, message: Telemetry) -> Result<(), ReceiverGone> {
        self.tx.send(message).map_err(|e| ReceiverGone(e.0))
    }

    /// Whether the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: UnboundedReceiver<Telemetry>,
}

impl InboundReceiver {
    /// Next message in arrival order, or `None` once drained and closed.
    pub async fn recv(&mut self) -> Option<Telemetry> {
        self.rx.recv().await
    }

    /// Next message if one is buffered.
    pub fn try_recv(&mut self) -> Option<Telemetry> {
        self.rx.try_recv().ok()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
