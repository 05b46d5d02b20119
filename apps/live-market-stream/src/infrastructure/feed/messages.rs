//! Feed Wire Messages
//!
//! JSON frames pushed by the market backend on `/<path>/<symbol>`.
//!
//! # Frame Types
//!
//! - `PriceTickMessage`: price, 24h statistics and the backend's signal
//! - `FeedErrorMessage`: `{"error": "..."}` sent when the backend's own
//!   upstream fails
//!
//! ```json
//! {"symbol": "BTC", "price": 64230.1, "price_change_24h": 2.5,
//!  "high_24h": 65010.0, "low_24h": 63100.2, "volume_24h": 18234.7,
//!  "timestamp": "2024-05-01T12:00:00.123456",
//!  "signal": "BUY", "signal_emoji": "🟢", "message": "Strong upward momentum"}
//! ```

use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::{MarketUpdate, PriceSnapshot, Signal, SignalType};

/// A price frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTickMessage {
    /// Upstream ticker, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Last price.
    pub price: Decimal,
    /// 24-hour change in percent.
    pub price_change_24h: Decimal,
    /// 24-hour high.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_24h: Option<Decimal>,
    /// 24-hour low.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_24h: Option<Decimal>,
    /// 24-hour volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<Decimal>,
    /// ISO-8601 timestamp, with or without offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Signal classification.
    pub signal: SignalType,
    /// Signal glyph.
    pub signal_emoji: String,
    /// Advisory text.
    pub message: String,
}

impl PriceTickMessage {
    /// Parse `timestamp`. Unparsable values are treated as absent.
    #[must_use]
    pub fn as_of(&self) -> Option<NaiveDateTime> {
        let raw = self.timestamp.as_deref()?.trim();
        raw.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
    }

    /// Convert into the domain update.
    #[must_use]
    pub fn into_update(self) -> MarketUpdate {
        let as_of = self.as_of();
        MarketUpdate {
            price: PriceSnapshot {
                price: self.price,
                price_change_24h: self.price_change_24h,
                high_24h: self.high_24h,
                low_24h: self.low_24h,
                volume_24h: self.volume_24h,
                as_of,
            },
            signal: Signal {
                kind: self.signal,
                emoji: self.signal_emoji,
                message: self.message,
            },
        }
    }
}

/// Error frame reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedErrorMessage {
    /// Backend error description.
    pub error: String,
}

/// Any decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Price update.
    Tick(Box<PriceTickMessage>),
    /// Backend-reported error.
    Error(FeedErrorMessage),
}
