#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Live Market Stream - Price and signal stream client
//!
//! Keeps one WebSocket subscription per trading symbol and exposes a
//! `{price, signal, connected, error}` state for each. When the live feed
//! cannot be reached, a timed fallback applies reference data with a
//! conservative `HOLD` signal so callers always have a price.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: pure types and transition rules
//!   - `market`: symbols, snapshots, signals, `StreamState`
//!   - `session`: per-subscription state machine
//!   - `fallback`: reference table
//!
//! - **Application**: ports and services
//!   - `ports`: `FeedTransport` / `FeedConnection`
//!   - `services`: `MarketStreamClient`, `SubscriptionHandle`, drivers
//!
//! - **Infrastructure**: adapters
//!   - `feed`: WebSocket transport, codec, reconnect policy
//!   - `config`, `metrics`, `telemetry`
//!
//! # Example
//!
//! ```no_run
//! use live_market_stream::{MarketStreamClient, StreamClientConfig};
//!
//! # async fn run() -> Result<(), live_market_stream::StreamError> {
//! let client = MarketStreamClient::new(StreamClientConfig::default())?;
//! let btc = client.subscribe("BTC")?;
//! btc.on_state_change(|state| println!("{state:?}"));
//! // ...
//! btc.unsubscribe();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Stream types and state machine with no I/O.
pub mod domain;

/// Application layer - Ports and subscription services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::error::StreamError;
pub use domain::fallback::{FALLBACK_ADVISORY, FALLBACK_EMOJI, FallbackEntry, FallbackTable};
pub use domain::market::{MarketUpdate, PriceSnapshot, Signal, SignalType, StreamState, Symbol};
pub use domain::session::{FallbackTrigger, StreamPhase, StreamSession, Transition};

// Ports and services
pub use application::ports::{FeedConnection, FeedTransport};
pub use application::services::{
    MarketStreamClient, ObserverHandle, StateObserver, SubscriptionHandle,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, StreamClientConfig, WatcherSettings};
pub use infrastructure::feed::{
    FeedCodec, PriceTickMessage, ReconnectConfig, ReconnectMode, WebSocketTransport,
};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
