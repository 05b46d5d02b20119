//! Configuration Module
//!
//! Client configuration and environment loading.

mod settings;

pub use settings::{ConfigError, StreamClientConfig, WatcherSettings};
