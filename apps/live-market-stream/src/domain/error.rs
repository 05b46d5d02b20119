//! Stream Errors
//!
//! Only `Configuration` is fatal. Everything else is either rejected at
//! `subscribe` time or absorbed into `StreamState::error`.

/// Errors produced by the stream client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The requested symbol cannot be used as a stream key.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// A feed frame could not be decoded. The frame is dropped.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The feed connection failed or was lost.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The client cannot be constructed with the given configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StreamError {
    /// Whether this error prevents the client from being used at all.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        assert!(StreamError::Configuration("empty table".into()).is_fatal());
        assert!(!StreamError::InvalidSymbol(String::new()).is_fatal());
        assert!(!StreamError::MalformedMessage("x".into()).is_fatal());
        assert!(!StreamError::ConnectionError("refused".into()).is_fatal());
    }

    #[test]
    fn display_includes_kind() {
        let err = StreamError::ConnectionError("Connection refused".into());
        assert_eq!(err.to_string(), "connection error: Connection refused");
    }
}
