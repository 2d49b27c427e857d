//! JSON text codec for websocket frames
//!
//! Every websocket text frame carries exactly one JSON document, so message
//! boundaries come from the websocket framing itself. The codec only enforces
//! the size limit and the envelope shapes.

use serde::Serialize;
use thiserror::Error;

use crate::{CommandEnvelope, Inbound, ReplyEnvelope};

/// Maximum message size (1 MB) to prevent memory exhaustion
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn encode<T: Serialize>(message: &T) -> Result<String, CodecError> {
    let text = serde_json::to_string(message)?;
    check_size(&text)?;
    Ok(text)
}

fn check_size(text: &str) -> Result<(), CodecError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(text.len()));
    }
    Ok(())
}

/// Encode a command for the device channel
pub fn encode_command(command: &CommandEnvelope) -> Result<String, CodecError> {
    encode(command)
}

/// Encode a direct reply (endpoint side)
pub fn encode_reply(reply: &ReplyEnvelope) -> Result<String, CodecError> {
    encode(reply)
}

/// Decode and classify a message received from an endpoint
pub fn decode_inbound(text: &str) -> Result<Inbound, CodecError> {
    check_size(text)?;
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(Inbound::classify(value))
}

/// Decode a command received from the broker (endpoint side)
pub fn decode_command(text: &str) -> Result<CommandEnvelope, CodecError> {
    check_size(text)?;
    Ok(serde_json::from_str(text)?)
}
