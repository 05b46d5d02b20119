//! Application Services
//!
//! - `MarketStreamClient`: subscribe / unsubscribe, one stream per symbol
//! - `SubscriptionHandle`: state reads, watch channel, observers
//! - driver: the per-subscription task running the session state machine

mod client;
mod driver;
mod observers;

pub use client::{MarketStreamClient, SubscriptionHandle};
pub use observers::{ObserverHandle, StateObserver};
