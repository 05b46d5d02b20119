//! Port Interfaces
//!
//! Contracts the feed adapters implement.
//!
//! - `FeedTransport`: opens one connection to a symbol endpoint
//! - `FeedConnection`: yields raw text frames until the connection ends
//!
//! The WebSocket adapter lives in `infrastructure::feed`. Tests plug in
//! scripted transports through the same traits.

use async_trait::async_trait;

use crate::domain::error::StreamError;

/// Factory for feed connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a connection to `endpoint`.
    ///
    /// Resolving means the socket is open; the caller treats it as the
    /// `open` event.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::ConnectionError` if the connection cannot be
    /// established.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, StreamError>;
}

/// An open feed connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnection: Send {
    /// Next text frame.
    ///
    /// `None` means the peer closed the connection. `Some(Err(_))` is a
    /// transport error; the connection is unusable afterwards.
    async fn next_frame(&mut self) -> Option<Result<String, StreamError>>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self);
}
