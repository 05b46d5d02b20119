//! Fallback Reference Data
//!
//! Deterministic price data substituted when the live feed cannot be
//! reached. Lookups never touch the network and the signal is always
//! `HOLD`, so synthetic data is never presented as actionable advice.
//!
//! The table is ordered; its first entry doubles as the default for
//! symbols the table does not know.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::StreamError;
use super::market::{PriceSnapshot, Signal, SignalType, Symbol};

/// Glyph attached to every fallback signal.
pub const FALLBACK_EMOJI: &str = "🟡";

/// Advisory attached to every fallback signal.
pub const FALLBACK_ADVISORY: &str = "Live feed unavailable, showing reference data";

/// One row of the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    /// Primary stream key (e.g. `btc`).
    pub symbol: String,
    /// Alternate keys that resolve to this row (e.g. `bitcoin`).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Reference price.
    pub price: Decimal,
    /// Reference 24-hour change in percent.
    pub price_change_24h: Decimal,
}

impl FallbackEntry {
    /// Row without aliases.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: Decimal, price_change_24h: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            aliases: Vec::new(),
            price,
            price_change_24h,
        }
    }

    /// Add an alternate key.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    fn matches(&self, symbol: &Symbol) -> bool {
        self.symbol == symbol.as_str() || self.aliases.iter().any(|a| a == symbol.as_str())
    }

    fn normalized(self) -> Result<Self, StreamError> {
        let symbol = Symbol::parse(&self.symbol).map_err(|e| {
            StreamError::Configuration(format!("fallback entry {:?}: {e}", self.symbol))
        })?;
        let aliases = self
            .aliases
            .iter()
            .map(|alias| {
                Symbol::parse(alias)
                    .map(|s| s.as_str().to_string())
                    .map_err(|e| {
                        StreamError::Configuration(format!("fallback alias {alias:?}: {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            symbol: symbol.as_str().to_string(),
            aliases,
            ..self
        })
    }
}

/// Ordered, non-empty reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTable {
    entries: Vec<FallbackEntry>,
}

impl FallbackTable {
    /// Build a table. Symbols and aliases are normalized like stream keys.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Configuration` if `entries` is empty or any
    /// key is not a valid symbol.
    pub fn new(entries: Vec<FallbackEntry>) -> Result<Self, StreamError> {
        if entries.is_empty() {
            return Err(StreamError::Configuration(
                "fallback table is empty".to_string(),
            ));
        }

        let entries = entries
            .into_iter()
            .map(FallbackEntry::normalized)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// The built-in reference table.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            entries: reference_entries(),
        }
    }

    /// Parse a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Configuration` on invalid JSON or an invalid table.
    pub fn from_json_str(json: &str) -> Result<Self, StreamError> {
        let entries: Vec<FallbackEntry> = serde_json::from_str(json)
            .map_err(|e| StreamError::Configuration(format!("fallback table: {e}")))?;
        Self::new(entries)
    }

    /// Read and parse a JSON table from disk.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Configuration` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Configuration(format!("fallback table {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Row for `symbol`, or the default row when the symbol is unknown.
    #[must_use]
    pub fn lookup(&self, symbol: &Symbol) -> &FallbackEntry {
        self.entries
            .iter()
            .find(|entry| entry.matches(symbol))
            .unwrap_or_else(|| self.default_entry())
    }

    /// Whether `symbol` has its own row.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.iter().any(|entry| entry.matches(symbol))
    }

    /// The first row.
    #[must_use]
    pub fn default_entry(&self) -> &FallbackEntry {
        // Non-empty by construction.
        &self.entries[0]
    }

    /// All rows in table order.
    #[must_use]
    pub fn entries(&self) -> &[FallbackEntry] {
        &self.entries
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for the `len` convention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synthetic snapshot and `HOLD` signal for `symbol`.
    #[must_use]
    pub fn snapshot_for(&self, symbol: &Symbol) -> (PriceSnapshot, Signal) {
        let entry = self.lookup(symbol);
        let snapshot = PriceSnapshot::new(entry.price, entry.price_change_24h);
        let signal = Signal {
            kind: SignalType::Hold,
            emoji: FALLBACK_EMOJI.to_string(),
            message: FALLBACK_ADVISORY.to_string(),
        };
        (snapshot, signal)
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::reference()
    }
}

/// Rows of the built-in table, default first.
#[must_use]
pub fn reference_entries() -> Vec<FallbackEntry> {
    [
        ("btc", "bitcoin", Decimal::new(64230, 0), Decimal::new(25, 1)),
        ("eth", "ethereum", Decimal::new(3450, 0), Decimal::new(-12, 1)),
        ("sol", "solana", Decimal::new(145, 0), Decimal::new(54, 1)),
        ("bnb", "binancecoin", Decimal::new(590, 0), Decimal::new(8, 1)),
        ("xrp", "ripple", Decimal::new(62, 2), Decimal::new(-5, 1)),
        ("ada", "cardano", Decimal::new(45, 2), Decimal::new(11, 1)),
        ("avax", "avalanche-2", Decimal::new(3520, 2), Decimal::new(42, 1)),
        ("doge", "dogecoin", Decimal::new(16, 2), Decimal::new(-23, 1)),
        ("dot", "polkadot", Decimal::new(720, 2), Decimal::new(5, 1)),
        ("link", "chainlink", Decimal::new(1450, 2), Decimal::new(31, 1)),
    ]
    .into_iter()
    .map(|(symbol, alias, price, change)| FallbackEntry::new(symbol, price, change).with_alias(alias))
    .collect()
}
