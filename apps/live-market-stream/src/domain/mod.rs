//! Domain Layer - Core stream types and state transition rules.
//!
//! This layer contains the market data types, the per-subscription state
//! machine, and the fallback reference data. Nothing here performs I/O
//! or spawns tasks.

/// Error taxonomy shared by every layer.
pub mod error;

/// Symbols, price snapshots, signals and the observable stream state.
pub mod market;

/// Per-subscription state machine (`Idle → Connecting → Live | Degraded → Closed`).
pub mod session;

/// Reference data used when the live feed is unavailable.
pub mod fallback;
