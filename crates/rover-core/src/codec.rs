//! JSON text framing: one object per WebSocket frame.
//!
//! Encoding validates the value first ([`WireMessage::check`]) because
//! `serde_json` silently writes non-finite floats as `null`, which would not
//! round-trip.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::CodecError;

/// A value that travels as one JSON frame.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Reject values the wire format cannot represent.
    fn check(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Encode one message as a JSON text frame.
pub fn encode<M: WireMessage>(message: &M) -> Result<String, CodecError> {
    message.check()?;
    serde_json::to_string(message).map_err(|e| CodecError::encoding(e.to_string()))
}

/// Decode one JSON text frame.
pub fn decode<M: WireMessage>(text: &str) -> Result<M, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::decoding(e.to_string()))
}

/// Decode a binary frame carrying UTF-8 JSON.
pub fn decode_bytes<M: WireMessage>(bytes: &[u8]) -> Result<M, CodecError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CodecError::decoding(format!("frame is not UTF-8: {e}")))?;
    decode(text)
}
