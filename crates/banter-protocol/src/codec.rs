//! Codec for encoding and decoding Banter frames.
//!
//! Frames travel as self-delimiting JSON text over a message-oriented
//! transport (one WebSocket text message per frame), so no length prefix
//! is needed.

use thiserror::Error;

use crate::events::{ClientFrame, ServerEvent};

/// Maximum accepted inbound frame size (64 KiB).
///
/// Uploads travel out-of-band over HTTP and are exempt; this bounds only
/// the chat control plane.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON serialization error.
    #[error("Codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a client frame from JSON text.
///
/// # Errors
///
/// Returns an error if the frame is oversized or not a known frame shape.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}
