//! Live Feed Adapters
//!
//! - **websocket**: `FeedTransport` over tokio-tungstenite
//! - **codec** / **messages**: JSON frame decoding
//! - **reconnect**: backoff policy used in reconnecting mode

pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use codec::{CodecError, FeedCodec};
pub use messages::{FeedErrorMessage, FeedMessage, PriceTickMessage};
pub use reconnect::{ReconnectConfig, ReconnectMode, ReconnectPolicy};
pub use websocket::{WebSocketConnection, WebSocketTransport};
