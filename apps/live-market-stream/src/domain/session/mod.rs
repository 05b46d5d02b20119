//! Stream Session
//!
//! Per-subscription state machine:
//!
//! ```text
//! Idle → Connecting → Live | Degraded → Closed
//! ```
//!
//! `Live` is sticky: once the socket has opened, later errors are only
//! recorded. `Degraded` means fallback data was applied before the socket
//! ever opened; a late open upgrades it to `Live`. `Closed` is terminal
//! and every event after it is ignored.
//!
//! The session is owned by a single driver task, so it holds no locks.
//! Each event method returns a [`Transition`] telling the caller whether
//! observers need to hear about it.

use serde::Serialize;

use super::fallback::FallbackTable;
use super::market::{MarketUpdate, StreamState, Symbol};

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Not yet started.
    #[default]
    Idle,
    /// Connection requested, fallback timer running.
    Connecting,
    /// The socket opened at least once.
    Live,
    /// Fallback data applied before the socket ever opened.
    Degraded,
    /// Unsubscribed.
    Closed,
}

impl StreamPhase {
    /// Lowercase name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    /// Whether the phase is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// What caused fallback data to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackTrigger {
    /// The fallback timeout elapsed without live data.
    Timer,
    /// The connection failed before it ever opened.
    Error,
    /// The connection closed before it ever opened.
    Close,
}

impl FallbackTrigger {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Error => "error",
            Self::Close => "close",
        }
    }
}

/// Outcome of feeding one event to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Observable state is unchanged.
    Unchanged,
    /// Observable state changed.
    Updated,
    /// Fallback data was applied.
    FallbackApplied(FallbackTrigger),
}

impl Transition {
    /// Whether observers must be notified.
    #[must_use]
    pub const fn is_updated(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

// =============================================================================
// Session
// =============================================================================

/// State machine for one symbol subscription.
#[derive(Debug, Clone)]
pub struct StreamSession {
    symbol: Symbol,
    phase: StreamPhase,
    state: StreamState,
    ever_opened: bool,
    live_data: bool,
    fallback_applied: bool,
}

impl StreamSession {
    /// Fresh session in `Idle`.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            phase: StreamPhase::Idle,
            state: StreamState::default(),
            ever_opened: false,
            live_data: false,
            fallback_applied: false,
        }
    }

    /// Subscribed symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Current observable state.
    #[must_use]
    pub const fn state(&self) -> &StreamState {
        &self.state
    }

    /// Whether the socket has opened at least once.
    #[must_use]
    pub const fn has_opened(&self) -> bool {
        self.ever_opened
    }

    /// Whether the fallback timer still has work to do.
    #[must_use]
    pub const fn fallback_pending(&self) -> bool {
        !self.live_data && !self.fallback_applied && !self.phase.is_closed()
    }

    /// A connection attempt is starting. Only `Idle` moves to `Connecting`;
    /// reconnects keep the current phase.
    pub fn begin_connect(&mut self) -> Transition {
        if self.phase == StreamPhase::Idle {
            self.phase = StreamPhase::Connecting;
        }
        Transition::Unchanged
    }

    /// The socket opened.
    pub fn on_open(&mut self) -> Transition {
        if self.phase.is_closed() {
            return Transition::Unchanged;
        }
        self.ever_opened = true;
        self.phase = StreamPhase::Live;

        let mut next = self.state.clone();
        next.error = None;
        next.connected = next.price.is_some();
        self.commit(next)
    }

    /// A decoded price frame arrived. Always notifies.
    pub fn on_update(&mut self, update: MarketUpdate) -> Transition {
        if self.phase.is_closed() {
            return Transition::Unchanged;
        }
        self.ever_opened = true;
        self.live_data = true;
        self.phase = StreamPhase::Live;

        self.state.price = Some(update.price);
        self.state.signal = Some(update.signal);
        self.state.connected = true;
        Transition::Updated
    }

    /// The feed reported an upstream error in-band. Data is kept.
    pub fn on_feed_error(&mut self, message: &str) -> Transition {
        if self.phase.is_closed() {
            return Transition::Unchanged;
        }
        let mut next = self.state.clone();
        next.error = Some(message.to_string());
        self.commit(next)
    }

    /// The connection failed or errored.
    pub fn on_error(&mut self, error: &str, table: &FallbackTable) -> Transition {
        if self.phase.is_closed() {
            return Transition::Unchanged;
        }
        if !self.ever_opened && self.fallback_pending() {
            self.state.error = Some(error.to_string());
            self.apply_fallback(table);
            self.phase = StreamPhase::Degraded;
            return Transition::FallbackApplied(FallbackTrigger::Error);
        }

        let mut next = self.state.clone();
        next.error = Some(error.to_string());
        self.commit(next)
    }

    /// The connection ended.
    pub fn on_close(&mut self, table: &FallbackTable) -> Transition {
        if self.phase.is_closed() {
            return Transition::Unchanged;
        }

        if !self.ever_opened {
            if self.fallback_pending() {
                self.apply_fallback(table);
                self.phase = StreamPhase::Degraded;
                return Transition::FallbackApplied(FallbackTrigger::Close);
            }
            return Transition::Unchanged;
        }

        let mut next = self.state.clone();
        next.connected = false;
        self.commit(next)
    }

    /// The fallback timeout elapsed.
    pub fn on_fallback_timer(&mut self, table: &FallbackTable) -> Transition {
        if !self.fallback_pending() {
            return Transition::Unchanged;
        }
        self.apply_fallback(table);
        self.phase = if self.ever_opened {
            StreamPhase::Live
        } else {
            StreamPhase::Degraded
        };
        Transition::FallbackApplied(FallbackTrigger::Timer)
    }

    /// Enter the terminal phase. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.phase.is_closed() {
            return false;
        }
        self.phase = StreamPhase::Closed;
        true
    }

    fn apply_fallback(&mut self, table: &FallbackTable) {
        let (snapshot, signal) = table.snapshot_for(&self.symbol);
        self.state.price = Some(snapshot);
        self.state.signal = Some(signal);
        self.state.connected = true;
        self.fallback_applied = true;
    }

    fn commit(&mut self, next: StreamState) -> Transition {
        if next == self.state {
            Transition::Unchanged
        } else {
            self.state = next;
            Transition::Updated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{PriceSnapshot, Signal, SignalType};
    use rust_decimal::Decimal;

    fn session(raw: &str) -> StreamSession {
        let mut session = StreamSession::new(Symbol::parse(raw).unwrap());
        session.begin_connect();
        session
    }

    fn buy(price: i64) -> MarketUpdate {
        MarketUpdate {
            price: PriceSnapshot::new(Decimal::new(price, 0), Decimal::new(11, 1)),
            signal: Signal {
                kind: SignalType::Buy,
                emoji: "🟢".into(),
                message: "Strong upward momentum".into(),
            },
        }
    }

    fn assert_invariant(session: &StreamSession) {
        let state = session.state();
        assert!(!state.connected || state.price.is_some());
    }

    #[test]
    fn begin_connect_moves_idle_to_connecting() {
        let mut s = StreamSession::new(Symbol::parse("btc").unwrap());
        assert_eq!(s.phase(), StreamPhase::Idle);
        assert_eq!(s.begin_connect(), Transition::Unchanged);
        assert_eq!(s.phase(), StreamPhase::Connecting);
        assert!(s.fallback_pending());
    }

    #[test]
    fn open_without_data_is_not_connected() {
        let mut s = session("eth");
        assert_eq!(s.on_open(), Transition::Unchanged);
        assert_eq!(s.phase(), StreamPhase::Live);
        assert!(!s.state().connected);
        assert!(s.fallback_pending());
        assert_invariant(&s);
    }

    #[test]
    fn first_frame_disarms_fallback() {
        let table = FallbackTable::reference();
        let mut s = session("eth");
        s.on_open();
        assert_eq!(s.on_update(buy(3500)), Transition::Updated);
        assert!(!s.fallback_pending());

        assert_eq!(s.on_fallback_timer(&table), Transition::Unchanged);
        let state = s.state();
        assert_eq!(state.price.as_ref().unwrap().price, Decimal::new(3500, 0));
        assert_eq!(state.signal_kind(), Some(SignalType::Buy));
        assert!(state.connected);
        assert!(state.error.is_none());
    }

    #[test]
    fn identical_frames_still_notify() {
        let mut s = session("eth");
        s.on_open();
        assert!(s.on_update(buy(1)).is_updated());
        assert!(s.on_update(buy(1)).is_updated());
    }

    #[test]
    fn error_before_open_applies_fallback() {
        let table = FallbackTable::reference();
        let mut s = session("btc");
        let t = s.on_error("connection error: Connection refused", &table);
        assert_eq!(t, Transition::FallbackApplied(FallbackTrigger::Error));
        assert_eq!(s.phase(), StreamPhase::Degraded);

        let state = s.state();
        assert!(state.connected);
        assert_eq!(state.price.as_ref().unwrap().price, Decimal::new(64230, 0));
        assert_eq!(state.signal_kind(), Some(SignalType::Hold));
        assert!(state.error.as_deref().unwrap().contains("refused"));

        // The follow-up close and the timer have nothing left to do.
        assert_eq!(s.on_close(&table), Transition::Unchanged);
        assert_eq!(s.on_fallback_timer(&table), Transition::Unchanged);
        assert!(s.state().connected);
    }

    #[test]
    fn close_before_open_applies_fallback() {
        let table = FallbackTable::reference();
        let mut s = session("sol");
        assert_eq!(
            s.on_close(&table),
            Transition::FallbackApplied(FallbackTrigger::Close)
        );
        assert_eq!(s.phase(), StreamPhase::Degraded);
        assert!(s.state().error.is_none());
    }

    #[test]
    fn timer_without_open_degrades() {
        let table = FallbackTable::reference();
        let mut s = session("pepe");
        assert_eq!(
            s.on_fallback_timer(&table),
            Transition::FallbackApplied(FallbackTrigger::Timer)
        );
        assert_eq!(s.phase(), StreamPhase::Degraded);
        assert_eq!(
            s.state().price.as_ref().unwrap().price,
            Decimal::new(64230, 0)
        );
    }

    #[test]
    fn timer_after_silent_open_stays_live() {
        let table = FallbackTable::reference();
        let mut s = session("eth");
        s.on_open();
        assert!(s.on_fallback_timer(&table).is_updated());
        assert_eq!(s.phase(), StreamPhase::Live);
        assert!(s.state().connected);
        assert_invariant(&s);
    }

    #[test]
    fn late_open_upgrades_degraded_without_touching_data() {
        let table = FallbackTable::reference();
        let mut s = session("btc");
        s.on_fallback_timer(&table);
        let fallback = s.state().clone();

        assert_eq!(s.on_open(), Transition::Unchanged);
        assert_eq!(s.phase(), StreamPhase::Live);
        assert_eq!(s.state(), &fallback);

        s.on_update(buy(70000));
        assert_eq!(s.state().signal_kind(), Some(SignalType::Buy));
    }

    #[test]
    fn open_clears_previous_error() {
        let table = FallbackTable::reference();
        let mut s = session("btc");
        s.on_error("boom", &table);
        assert_eq!(s.on_open(), Transition::Updated);
        assert!(s.state().error.is_none());
        assert!(s.state().connected);
    }

    #[test]
    fn live_is_sticky_through_errors() {
        let table = FallbackTable::reference();
        let mut s = session("eth");
        s.on_open();
        s.on_update(buy(3500));

        assert_eq!(s.on_error("reset by peer", &table), Transition::Updated);
        assert_eq!(s.phase(), StreamPhase::Live);
        assert_eq!(s.state().signal_kind(), Some(SignalType::Buy));

        assert_eq!(s.on_close(&table), Transition::Updated);
        assert_eq!(s.phase(), StreamPhase::Live);
        let state = s.state();
        assert!(!state.connected);
        assert!(state.price.is_some());
        assert_eq!(state.error.as_deref(), Some("reset by peer"));
    }

    #[test]
    fn reconnect_keeps_live_phase() {
        let table = FallbackTable::reference();
        let mut s = session("eth");
        s.on_open();
        s.on_update(buy(3500));
        s.on_close(&table);

        s.begin_connect();
        assert_eq!(s.phase(), StreamPhase::Live);
        assert_eq!(s.on_open(), Transition::Updated);
        assert!(s.state().connected);
    }

    #[test]
    fn feed_error_keeps_data() {
        let mut s = session("eth");
        s.on_open();
        s.on_update(buy(3500));
        assert_eq!(s.on_feed_error("upstream timeout"), Transition::Updated);
        assert_eq!(s.on_feed_error("upstream timeout"), Transition::Unchanged);

        let state = s.state();
        assert!(state.connected);
        assert_eq!(state.error.as_deref(), Some("upstream timeout"));
        assert!(state.price.is_some());
    }

    #[test]
    fn closed_ignores_everything() {
        let table = FallbackTable::reference();
        let mut s = session("btc");
        assert!(s.close());
        assert!(!s.close());
        assert!(!s.fallback_pending());

        assert_eq!(s.on_open(), Transition::Unchanged);
        assert_eq!(s.on_update(buy(1)), Transition::Unchanged);
        assert_eq!(s.on_error("x", &table), Transition::Unchanged);
        assert_eq!(s.on_feed_error("x"), Transition::Unchanged);
        assert_eq!(s.on_close(&table), Transition::Unchanged);
        assert_eq!(s.on_fallback_timer(&table), Transition::Unchanged);

        assert_eq!(s.phase(), StreamPhase::Closed);
        assert_eq!(s.state(), &StreamState::default());
    }

    #[test]
    fn phase_names() {
        assert_eq!(StreamPhase::Degraded.to_string(), "degraded");
        assert_eq!(FallbackTrigger::Close.as_str(), "close");
        assert_eq!(
            serde_json::to_string(&StreamPhase::Connecting).unwrap(),
            "\"connecting\""
        );
    }
}
