//! Application Layer - Subscription services and port definitions.
//!
//! This layer drives the domain state machine from feed events and
//! publishes the resulting state to callers. It talks to the network only
//! through the ports defined here.

/// Port interfaces for the live feed transport.
pub mod ports;

/// The stream client, subscription handles and per-subscription drivers.
pub mod services;
