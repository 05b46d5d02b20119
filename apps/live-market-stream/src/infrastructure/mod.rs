//! Infrastructure Layer - Adapters and external integrations.
//!
//! - `feed`: WebSocket transport, frame codec and reconnect policy
//! - `config`: client configuration and environment loading
//! - `metrics`: Prometheus metrics
//! - `telemetry`: tracing subscriber and OTLP export

/// Live feed adapters.
pub mod feed;

/// Configuration loading.
pub mod config;

/// Prometheus metrics.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
