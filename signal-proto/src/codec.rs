//! JSON encoding for the signaling wire protocol.
//!
//! One [`Message`] per transport frame, encoded as a JSON object. Text and
//! binary frames carry the same encoding.

use crate::message::Message;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not a valid JSON message.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encodes a [`Message`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode(msg: &Message) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::Encode)
}

/// Decodes a [`Message`] from raw frame bytes.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes are not a JSON message.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

/// Decodes a [`Message`] from a text frame.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the text is not a JSON message.
pub fn decode_str(text: &str) -> Result<Message, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}
