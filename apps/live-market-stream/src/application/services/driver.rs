//! Subscription Driver
//!
//! One task per subscription. Connection progress, frames, the fallback
//! timer, the reconnect timer and cancellation are arms of a single
//! `select!`, so session transitions run one at a time and never overlap.
//!
//! ```text
//! connect ──ok──► read frames ──end──► reconnect? ──yes──► connect
//!    │                                     │
//!    └──err──────────────────────────────► └──no──► wait for fallback, stop
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::client::SubscriptionShared;
use crate::application::ports::FeedTransport;
use crate::domain::error::StreamError;
use crate::domain::fallback::FallbackTable;
use crate::domain::session::{StreamSession, Transition};
use crate::infrastructure::feed::codec::FeedCodec;
use crate::infrastructure::feed::messages::FeedMessage;
use crate::infrastructure::feed::reconnect::{ReconnectMode, ReconnectPolicy};
use crate::infrastructure::metrics::{self, FrameOutcome};

/// Everything a driver task needs, handed over at spawn time.
pub(crate) struct DriverContext {
    pub(crate) shared: Arc<SubscriptionShared>,
    pub(crate) transport: Arc<dyn FeedTransport>,
    pub(crate) table: Arc<FallbackTable>,
    pub(crate) endpoint: String,
    pub(crate) fallback_timeout: Duration,
    pub(crate) reconnect: ReconnectMode,
}

/// What woke the driver.
enum Wake<T> {
    Cancelled,
    FallbackDue,
    Ready(T),
}

/// Session plus publication; every handler returns false once the
/// subscription is closed.
struct Driver {
    shared: Arc<SubscriptionShared>,
    table: Arc<FallbackTable>,
    session: StreamSession,
    codec: FeedCodec,
    fallback_armed: bool,
}

impl Driver {
    fn begin_connect(&mut self) -> bool {
        if !self.shared.is_alive() {
            return false;
        }
        let transition = self.session.begin_connect();
        self.apply(transition)
    }

    fn opened(&mut self) -> bool {
        if !self.shared.is_alive() {
            return false;
        }
        tracing::info!("Feed connected");
        let transition = self.session.on_open();
        self.apply(transition)
    }

    fn frame(&mut self, text: &str) -> bool {
        if !self.shared.is_alive() {
            return false;
        }
        let started = Instant::now();

        let alive = match self.codec.decode(text) {
            Ok(FeedMessage::Tick(tick)) => {
                metrics::record_frame(FrameOutcome::Applied);
                let transition = self.session.on_update(tick.into_update());
                self.apply(transition)
            }
            Ok(FeedMessage::Error(report)) => {
                metrics::record_frame(FrameOutcome::FeedError);
                tracing::warn!(error = %report.error, "Feed reported an error");
                let transition = self.session.on_feed_error(&report.error);
                self.apply(transition)
            }
            Err(e) => {
                metrics::record_frame(FrameOutcome::Malformed);
                tracing::warn!(error = %StreamError::from(e), "Dropping malformed frame");
                true
            }
        };

        metrics::record_frame_processing(started.elapsed());
        alive
    }

    fn failed(&mut self, error: &StreamError) -> bool {
        if !self.shared.is_alive() {
            return false;
        }
        metrics::record_connection_error();
        tracing::warn!(%error, opened = self.session.has_opened(), "Feed connection failed");
        let transition = self.session.on_error(&error.to_string(), &self.table);
        if !self.apply(transition) {
            return false;
        }
        self.closed()
    }

    fn closed(&mut self) -> bool {
        if !self.shared.is_alive() {
            return false;
        }
        tracing::debug!("Feed connection ended");
        let transition = self.session.on_close(&self.table);
        self.apply(transition)
    }

    fn fallback_due(&mut self) -> bool {
        self.fallback_armed = false;
        if !self.shared.is_alive() {
            return false;
        }
        let transition = self.session.on_fallback_timer(&self.table);
        self.apply(transition)
    }

    fn apply(&mut self, transition: Transition) -> bool {
        if let Transition::FallbackApplied(trigger) = transition {
            metrics::record_fallback(trigger);
            tracing::info!(
                trigger = trigger.as_str(),
                phase = %self.session.phase(),
                "Applied fallback data"
            );
        }
        self.fallback_armed &= self.session.fallback_pending();
        self.shared.publish(&self.session, transition.is_updated())
    }

    fn finish(mut self) {
        self.session.close();
        tracing::debug!(opened = self.session.has_opened(), "Stream driver stopped");
    }
}

/// Run one subscription until it is cancelled or has nothing left to do.
pub(crate) async fn run(ctx: DriverContext) {
    let DriverContext {
        shared,
        transport,
        table,
        endpoint,
        fallback_timeout,
        reconnect,
    } = ctx;

    let cancel: CancellationToken = shared.cancel_token();
    let mut policy: Option<ReconnectPolicy> = reconnect.policy();
    let fallback = tokio::time::sleep(fallback_timeout);
    tokio::pin!(fallback);

    let mut driver = Driver {
        session: StreamSession::new(shared.symbol().clone()),
        shared,
        table,
        codec: FeedCodec::new(),
        fallback_armed: true,
    };

    'stream: loop {
        if !driver.begin_connect() {
            break;
        }

        // Connect.
        let outcome = {
            let connect = transport.connect(&endpoint);
            tokio::pin!(connect);
            loop {
                let wake = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Wake::Cancelled,
                    result = &mut connect => Wake::Ready(result),
                    () = &mut fallback, if driver.fallback_armed => Wake::FallbackDue,
                };
                match wake {
                    Wake::Cancelled => break 'stream,
                    Wake::FallbackDue => {
                        if !driver.fallback_due() {
                            break 'stream;
                        }
                    }
                    Wake::Ready(result) => break result,
                }
            }
        };

        // Read until the connection ends.
        match outcome {
            Err(error) => {
                if !driver.failed(&error) {
                    break;
                }
            }
            Ok(mut connection) => {
                if let Some(policy) = policy.as_mut() {
                    policy.reset();
                }

                let keep_going = driver.opened()
                    && loop {
                        let wake = tokio::select! {
                            biased;
                            () = cancel.cancelled() => Wake::Cancelled,
                            frame = connection.next_frame() => Wake::Ready(frame),
                            () = &mut fallback, if driver.fallback_armed => Wake::FallbackDue,
                        };
                        let alive = match wake {
                            Wake::Cancelled => false,
                            Wake::FallbackDue => driver.fallback_due(),
                            Wake::Ready(Some(Ok(text))) => driver.frame(&text),
                            Wake::Ready(Some(Err(error))) => break driver.failed(&error),
                            Wake::Ready(None) => break driver.closed(),
                        };
                        if !alive {
                            break false;
                        }
                    };

                connection.close().await;
                if !keep_going {
                    break;
                }
            }
        }

        // Reconnect, or wait out the fallback timer and stop.
        let Some(delay) = policy.as_mut().and_then(ReconnectPolicy::next_delay) else {
            if policy.is_some() {
                tracing::warn!("Reconnect attempts exhausted");
            }
            while driver.fallback_armed {
                let wake = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Wake::Cancelled,
                    () = &mut fallback => Wake::<()>::FallbackDue,
                };
                if matches!(wake, Wake::Cancelled) || !driver.fallback_due() {
                    break;
                }
            }
            break;
        };

        metrics::record_reconnect();
        tracing::info!(
            attempt = policy.as_ref().map_or(0, ReconnectPolicy::attempt_count),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );

        let retry = tokio::time::sleep(delay);
        tokio::pin!(retry);
        loop {
            let wake = tokio::select! {
                biased;
                () = cancel.cancelled() => Wake::Cancelled,
                () = &mut retry => Wake::Ready(()),
                () = &mut fallback, if driver.fallback_armed => Wake::FallbackDue,
            };
            match wake {
                Wake::Cancelled => break 'stream,
                Wake::FallbackDue => {
                    if !driver.fallback_due() {
                        break 'stream;
                    }
                }
                Wake::Ready(()) => break,
            }
        }
    }

    driver.finish();
}
