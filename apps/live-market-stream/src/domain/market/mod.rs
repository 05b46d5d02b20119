//! Market Stream Types
//!
//! Canonical internal representation of what a live stream delivers:
//! a price snapshot, the trading signal that accompanies it, and the
//! `StreamState` observers see. These types are codec-agnostic.

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::StreamError;

// =============================================================================
// Symbol
// =============================================================================

/// A validated, lower-cased stream key (e.g. `btc`, `avalanche-2`).
///
/// The value is used verbatim as a URL path segment, so only ASCII
/// alphanumerics and `-`, `_`, `.` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a caller-supplied symbol.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidSymbol` if the symbol is empty after
    /// trimming or contains a character outside the accepted set.
    pub fn parse(raw: &str) -> Result<Self, StreamError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StreamError::InvalidSymbol("symbol is empty".to_string()));
        }

        if let Some(bad) = trimmed.chars().find(|c| !is_symbol_char(*c)) {
            return Err(StreamError::InvalidSymbol(format!(
                "unsupported character {bad:?} in {trimmed:?}"
            )));
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// The normalized key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Trading signal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    /// Accumulate.
    Buy,
    /// Reduce.
    Sell,
    /// No action.
    Hold,
}

impl SignalType {
    /// Wire name of the signal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal with its display glyph and advisory text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Classification.
    #[serde(rename = "type")]
    pub kind: SignalType,
    /// Display glyph (e.g. 🟢).
    pub emoji: String,
    /// Short human-readable advisory.
    pub message: String,
}

// =============================================================================
// Price Snapshot
// =============================================================================

/// Point-in-time price data for one symbol.
///
/// A new snapshot always replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Last traded price.
    pub price: Decimal,
    /// 24-hour change in percent.
    pub price_change_24h: Decimal,
    /// 24-hour high, when the feed provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_24h: Option<Decimal>,
    /// 24-hour low, when the feed provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_24h: Option<Decimal>,
    /// 24-hour base volume, when the feed provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<Decimal>,
    /// Producer timestamp, when the feed provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDateTime>,
}

impl PriceSnapshot {
    /// Snapshot with only the required fields.
    #[must_use]
    pub const fn new(price: Decimal, price_change_24h: Decimal) -> Self {
        Self {
            price,
            price_change_24h,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            as_of: None,
        }
    }
}

/// A snapshot paired with the signal it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketUpdate {
    /// Price data.
    pub price: PriceSnapshot,
    /// Signal derived from `price`.
    pub signal: Signal,
}

// =============================================================================
// Stream State
// =============================================================================

/// The externally observable state of one subscription.
///
/// Invariant: `connected` implies `price.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamState {
    /// Latest price, live or fallback.
    pub price: Option<PriceSnapshot>,
    /// Latest signal.
    pub signal: Option<Signal>,
    /// Whether data is flowing (live or degraded).
    pub connected: bool,
    /// Last recorded error.
    pub error: Option<String>,
}

impl StreamState {
    /// Whether a price has been applied at least once.
    #[must_use]
    pub const fn has_price(&self) -> bool {
        self.price.is_some()
    }

    /// Signal classification of the current state, if any.
    #[must_use]
    pub fn signal_kind(&self) -> Option<SignalType> {
        self.signal.as_ref().map(|s| s.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("btc", "btc" ; "already normalized")]
    #[test_case("BTC", "btc" ; "upper case")]
    #[test_case("  Eth \t", "eth" ; "surrounding whitespace")]
    #[test_case("avalanche-2", "avalanche-2" ; "coingecko id")]
    #[test_case("shiba_inu", "shiba_inu" ; "underscore")]
    fn symbol_normalizes(input: &str, expected: &str) {
        assert_eq!(Symbol::parse(input).unwrap().as_str(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("btc/usdt" ; "path separator")]
    #[test_case("btc usdt" ; "inner space")]
    #[test_case("btc?x=1" ; "query")]
    fn symbol_rejects(input: &str) {
        assert!(matches!(
            Symbol::parse(input),
            Err(StreamError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn signal_type_wire_names() {
        let buy: SignalType = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(buy, SignalType::Buy);
        assert_eq!(serde_json::to_string(&SignalType::Hold).unwrap(), "\"HOLD\"");
        assert!(serde_json::from_str::<SignalType>("\"buy\"").is_err());
        assert_eq!(SignalType::Sell.to_string(), "SELL");
    }

    #[test]
    fn signal_serializes_kind_as_type() {
        let signal = Signal {
            kind: SignalType::Hold,
            emoji: "🟡".into(),
            message: "steady".into(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "HOLD");
    }

    #[test]
    fn default_state_is_empty() {
        let state = StreamState::default();
        assert!(!state.connected);
        assert!(!state.has_price());
        assert!(state.signal_kind().is_none());
        assert!(state.error.is_none());
    }

    proptest! {
        #[test]
        fn parsed_symbols_are_lowercase_and_stable(raw in "[A-Za-z0-9._-]{1,16}") {
            let symbol = Symbol::parse(&raw).unwrap();
            prop_assert_eq!(symbol.as_str(), raw.to_ascii_lowercase());
            let again = Symbol::parse(symbol.as_str()).unwrap();
            prop_assert_eq!(again, symbol);
        }

        #[test]
        fn parse_never_panics(raw in ".*") {
            let _ = Symbol::parse(&raw);
        }
    }
}
