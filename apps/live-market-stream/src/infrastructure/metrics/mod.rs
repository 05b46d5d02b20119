//! Prometheus Metrics Module
//!
//! Stream client metrics through the `metrics` facade. Without an
//! installed recorder every recording call is a no-op, so library users
//! who never call `init_metrics` pay nothing.
//!
//! # Metrics
//!
//! - `live_stream_frames_received_total{outcome}`
//! - `live_stream_connection_errors_total`
//! - `live_stream_fallbacks_applied_total{trigger}`
//! - `live_stream_reconnects_total`
//! - `live_stream_active_subscriptions`
//! - `live_stream_frame_processing_seconds`

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::session::FallbackTrigger;

// =============================================================================
// Installation
// =============================================================================

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// `port == 0` disables the exporter. Repeated calls are no-ops.
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `BuildError` if the listener or recorder cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if port == 0 || INSTALLED.get().is_some() {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    let _ = INSTALLED.set(addr);
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "live_stream_frames_received_total",
        "Feed frames received, by outcome"
    );
    describe_counter!(
        "live_stream_connection_errors_total",
        "Feed connection failures and transport errors"
    );
    describe_counter!(
        "live_stream_fallbacks_applied_total",
        "Fallback snapshots applied, by trigger"
    );
    describe_counter!(
        "live_stream_reconnects_total",
        "Reconnection attempts"
    );
    describe_gauge!(
        "live_stream_active_subscriptions",
        "Subscriptions currently running"
    );
    describe_histogram!(
        "live_stream_frame_processing_seconds",
        "Time from frame receipt to state publication"
    );
}

// =============================================================================
// Recording
// =============================================================================

/// What happened to a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Decoded and published.
    Applied,
    /// Dropped as malformed.
    Malformed,
    /// Backend error frame.
    FeedError,
}

impl FrameOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Malformed => "malformed",
            Self::FeedError => "feed_error",
        }
    }
}

/// Record a received frame.
pub fn record_frame(outcome: FrameOutcome) {
    counter!("live_stream_frames_received_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a connection failure or transport error.
pub fn record_connection_error() {
    counter!("live_stream_connection_errors_total").increment(1);
}

/// Record an applied fallback.
pub fn record_fallback(trigger: FallbackTrigger) {
    counter!("live_stream_fallbacks_applied_total", "trigger" => trigger.as_str()).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("live_stream_reconnects_total").increment(1);
}

/// Update the running subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("live_stream_active_subscriptions").set(count as f64);
}

/// Record time spent handling one frame.
pub fn record_frame_processing(duration: Duration) {
    histogram!("live_stream_frame_processing_seconds").record(duration.as_secs_f64());
}
