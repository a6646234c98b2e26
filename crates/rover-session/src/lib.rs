//! # rover-session
//!
//! Connection core of the rover link:
//!
//! - [`Session`]: one WebSocket connection, its state machine, receive loop
//!   and serialised send path
//! - [`InboundQueue`]: unbounded FIFO from the receive loop to the consumer
//! - [`Processor`]: dispatches queued messages to [`MessageObserver`]s
//! - [`CommandSink`]: outbound seam implemented by [`Session`]

#![deny(unsafe_code)]

pub mod endpoint;
pub mod processor;
pub mod queue;
pub mod session;
pub mod sink;
pub mod state;

pub use endpoint::{Endpoint, EndpointParseError};
pub use processor::{MessageObserver, Processor, ProcessorConfig, ProcessorExit, ProcessorReport};
pub use queue::{InboundQueue, InboundReceiver, InboundSender, ReceiverGone};
pub use session::{Session, SessionStats};
pub use sink::CommandSink;
pub use state::SessionState;
