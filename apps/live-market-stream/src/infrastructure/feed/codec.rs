//! Feed Codec
//!
//! JSON text frames in, `FeedMessage` out. A frame is a single JSON
//! object; an object carrying an `error` key is a backend error report,
//! anything else must be a complete price tick.

use crate::domain::error::StreamError;
use crate::infrastructure::feed::messages::{FeedErrorMessage, FeedMessage, PriceTickMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl From<CodecError> for StreamError {
    fn from(err: CodecError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

/// Stateless JSON codec for feed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the frame is not a JSON object or lacks a
    /// required tick field.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        if value.get("error").is_some() {
            let err: FeedErrorMessage = serde_json::from_value(value)?;
            return Ok(FeedMessage::Error(err));
        }

        let tick: PriceTickMessage = serde_json::from_value(value)?;
        Ok(FeedMessage::Tick(Box::new(tick)))
    }

    /// Encode a tick. Used by local feeds and tests.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if serialization fails.
    pub fn encode(&self, tick: &PriceTickMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(tick)?)
    }
}
