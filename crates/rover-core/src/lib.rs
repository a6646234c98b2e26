//! # rover-core
//!
//! Foundation types shared by every rover-link crate:
//!
//! - **Messages**: [`Direction`], outbound [`Command`] and inbound [`Telemetry`]
//! - **Codec**: JSON text framing via [`codec::encode`] / [`codec::decode`]
//! - **Errors**: [`SessionError`], [`CodecError`], [`ObserverError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod logging;
pub mod messages;

pub use codec::WireMessage;
pub use errors::{CodecError, ObserverError, SendFailure, SessionError};
pub use messages::{Command, Direction, Telemetry};
