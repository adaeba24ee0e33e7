//! Stream Codec Module
//!
//! JSON encoding and decoding for the price stream.
//!
//! Every inbound text frame carries exactly one JSON object with a `type`
//! discriminator; every outbound frame is one JSON object with an `action`.

use crate::infrastructure::feed::messages::{Command, InboundMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the price stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into an [`InboundMessage`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, lacks a `type`,
    /// or a known kind carries fields of the wrong shape.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode a command into a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, command: &Command) -> Result<String, CodecError> {
        Ok(serde_json::to_string(command)?)
    }
}
