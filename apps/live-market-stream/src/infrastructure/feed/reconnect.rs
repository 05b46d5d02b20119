//! Reconnection Policy
//!
//! Exponential backoff with jitter between feed connection attempts.
//! Only consulted when a subscription runs in `ReconnectMode::Backoff`;
//! the default mode makes a single attempt.

use std::time::Duration;

use rand::Rng;

/// How a subscription behaves once its connection ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReconnectMode {
    /// At most one connection attempt per subscription.
    #[default]
    Never,
    /// Reconnect after a backoff delay until attempts run out.
    Backoff(ReconnectConfig),
}

impl ReconnectMode {
    /// Build a fresh policy, or `None` when reconnection is disabled.
    #[must_use]
    pub fn policy(&self) -> Option<ReconnectPolicy> {
        match self {
            Self::Never => None,
            Self::Backoff(config) => Some(ReconnectPolicy::new(config.clone())),
        }
    }
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed between successful opens (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Constant delay with no jitter and no attempt limit.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Same config with an attempt limit.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Stateful backoff sequence.
///
/// ```rust
/// use live_market_stream::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Start a sequence at the initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.jittered(self.current_delay);
        let grown = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);

        Some(delay)
    }

    /// Restart the sequence after a successful open.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let spread = base.as_secs_f64() * self.config.jitter_factor;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::try_from_secs_f64((base.as_secs_f64() + offset).max(0.001)).unwrap_or(base)
    }
}
