//! WebSocket Feed Adapter
//!
//! `FeedTransport` over `tokio-tungstenite`. Text frames are passed
//! through untouched, binary frames are read as lossy UTF-8, and pings are
//! answered explicitly. Control frames never surface to the driver.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnection, FeedTransport};
use crate::domain::error::StreamError;

/// Upper bound on a graceful close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens one WebSocket per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, StreamError> {
        tracing::debug!(endpoint, "Opening feed socket");
        let (stream, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| StreamError::ConnectionError(e.to_string()))?;
        tracing::debug!(endpoint, status = %response.status(), "Feed socket open");

        Ok(Box::new(WebSocketConnection {
            stream,
            closed: false,
        }))
    }
}

/// An open feed socket.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<String, StreamError>> {
        if self.closed {
            return None;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        self.closed = true;
                        return Some(Err(StreamError::ConnectionError(e.to_string())));
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Feed sent close frame");
                    self.closed = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(StreamError::ConnectionError(e.to_string())));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match tokio::time::timeout(CLOSE_TIMEOUT, self.stream.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Feed close failed"),
            Err(_) => tracing::debug!("Feed close timed out"),
        }
    }
}
