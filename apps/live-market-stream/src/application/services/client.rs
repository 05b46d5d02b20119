//! Market Stream Client
//!
//! Owns one driver task per subscribed symbol and hands out
//! [`SubscriptionHandle`]s for reading and observing each stream.
//!
//! # Publication
//!
//! The driver publishes through `SubscriptionShared`. A per-subscription
//! gate is held while observers run. `unsubscribe` called from outside any
//! observer waits on that gate, so once it returns no further state write
//! or callback happens.
//!
//! Observers may unsubscribe any stream, their own included, from inside
//! a callback. Such a call never waits on a gate: it flips the liveness
//! flag, and the dispatch loop skips every remaining observer.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::driver::{self, DriverContext};
use super::observers::{ObserverHandle, ObserverRegistry, StateObserver};
use crate::application::ports::FeedTransport;
use crate::domain::error::StreamError;
use crate::domain::fallback::FallbackTable;
use crate::domain::market::{StreamState, Symbol};
use crate::domain::session::{StreamPhase, StreamSession};
use crate::infrastructure::config::StreamClientConfig;
use crate::infrastructure::feed::websocket::WebSocketTransport;
use crate::infrastructure::metrics;

// =============================================================================
// Shared Subscription State
// =============================================================================

#[derive(Debug, Default)]
struct Published {
    state: StreamState,
    phase: StreamPhase,
}

/// State shared between a driver task and its handles.
pub(crate) struct SubscriptionShared {
    id: Uuid,
    symbol: Symbol,
    alive: AtomicBool,
    cancel: CancellationToken,
    gate: Mutex<()>,
    published: RwLock<Published>,
    watch_tx: watch::Sender<StreamState>,
    observers: Arc<ObserverRegistry>,
}

impl SubscriptionShared {
    fn new(symbol: Symbol) -> Self {
        let (watch_tx, _) = watch::channel(StreamState::default());
        Self {
            id: Uuid::new_v4(),
            symbol,
            alive: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            gate: Mutex::new(()),
            published: RwLock::new(Published::default()),
            watch_tx,
            observers: Arc::new(ObserverRegistry::default()),
        }
    }

    pub(crate) const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Copy the session into the published slot. With `notify`, the watch
    /// channel and every observer hear about it. Returns false once closed.
    pub(crate) fn publish(&self, session: &StreamSession, notify: bool) -> bool {
        let _gate = self.gate.lock();

        let state = {
            let mut published = self.published.write();
            // Checked under the write lock so a concurrent close always
            // lands its phase last.
            if !self.is_alive() {
                return false;
            }
            published.phase = session.phase();
            published.state = session.state().clone();
            published.state.clone()
        };

        if notify && self.is_alive() {
            self.watch_tx.send_replace(state.clone());

            let _dispatching = DispatchGuard::enter();
            for observer in self.observers.snapshot() {
                // Any observer may have unsubscribed this stream.
                if !self.is_alive() {
                    break;
                }
                observer(&state);
            }
        }
        self.is_alive()
    }

    /// Flip the liveness flag and cancel the driver. Returns false if
    /// already closed.
    ///
    /// Outside an observer this waits for an in-flight publication to
    /// finish. Inside one it returns at once, so observers of different
    /// streams can close each other without deadlock.
    fn close(&self) -> bool {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        self.observers.clear();
        self.published.write().phase = StreamPhase::Closed;

        if !DispatchGuard::active() {
            drop(self.gate.lock());
        }
        true
    }
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running observers until dropped.
struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Self {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }

    fn active() -> bool {
        DISPATCH_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl std::fmt::Debug for SubscriptionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionShared")
            .field("id", &self.id)
            .field("symbol", &self.symbol)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Caller-side view of one symbol subscription.
///
/// Cloning is cheap; every clone refers to the same subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    shared: Arc<SubscriptionShared>,
    client: Weak<ClientInner>,
}

impl SubscriptionHandle {
    /// Latest published state. Never blocks on the driver.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.shared.published.read().state.clone()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.shared.published.read().phase
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<StreamState> {
        self.shared.watch_tx.subscribe()
    }

    /// Register a callback invoked synchronously, in order, for every
    /// accepted state change.
    pub fn on_state_change<F>(&self, handler: F) -> ObserverHandle
    where
        F: Fn(&StreamState) + Send + Sync + 'static,
    {
        self.shared.observers.register(Arc::new(handler))
    }

    /// Stop the stream: close the socket, cancel all timers, drop observers.
    /// Idempotent.
    pub fn unsubscribe(&self) {
        if !self.shared.close() {
            return;
        }
        if let Some(client) = self.client.upgrade() {
            client.release(&self.shared);
        }
        tracing::info!(symbol = %self.shared.symbol, id = %self.shared.id, "Unsubscribed");
    }

    /// Whether `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_alive()
    }

    /// Normalized symbol.
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.shared.symbol
    }

    /// Unique subscription id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }
}

// =============================================================================
// Client
// =============================================================================

struct ClientInner {
    config: StreamClientConfig,
    table: Arc<FallbackTable>,
    transport: Arc<dyn FeedTransport>,
    subscriptions: Mutex<HashMap<Symbol, Arc<SubscriptionShared>>>,
}

impl ClientInner {
    fn release(&self, shared: &Arc<SubscriptionShared>) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions
            .get(&shared.symbol)
            .is_some_and(|current| Arc::ptr_eq(current, shared))
        {
            subscriptions.remove(&shared.symbol);
        }
        metrics::set_active_subscriptions(subscriptions.len());
    }
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("feed_base_url", &self.config.feed_base_url)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

/// Live market stream client.
///
/// One active subscription per symbol. Dropping the client unsubscribes
/// everything it started.
#[derive(Debug)]
pub struct MarketStreamClient {
    inner: Arc<ClientInner>,
}

impl MarketStreamClient {
    /// Client using the WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Configuration` for an empty or invalid fallback
    /// table or a non-WebSocket base URL.
    pub fn new(config: StreamClientConfig) -> Result<Self, StreamError> {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    /// Client using a custom transport.
    ///
    /// # Errors
    ///
    /// See [`MarketStreamClient::new`].
    pub fn with_transport(
        config: StreamClientConfig,
        transport: Arc<dyn FeedTransport>,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let table = FallbackTable::new(config.fallback_table.clone())?;

        tracing::debug!(
            feed_base_url = %config.feed_base_url,
            fallback_timeout = ?config.fallback_timeout,
            fallback_entries = table.len(),
            "Stream client created"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                table: Arc::new(table),
                transport,
                subscriptions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Start streaming `symbol`, or return the existing handle if the
    /// symbol is already subscribed.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidSymbol` for an unusable symbol and
    /// `StreamError::Configuration` outside a Tokio runtime. Neither has
    /// side effects.
    pub fn subscribe(&self, symbol: &str) -> Result<SubscriptionHandle, StreamError> {
        self.subscribe_inner(symbol, |_| ()).map(|(handle, ())| handle)
    }

    /// Like [`subscribe`](Self::subscribe), registering `handler` before the
    /// driver starts so no state change is missed. The returned
    /// [`ObserverHandle`] removes `handler` again, also when the symbol was
    /// already subscribed.
    ///
    /// # Errors
    ///
    /// See [`MarketStreamClient::subscribe`].
    pub fn subscribe_with<F>(
        &self,
        symbol: &str,
        handler: F,
    ) -> Result<(SubscriptionHandle, ObserverHandle), StreamError>
    where
        F: Fn(&StreamState) + Send + Sync + 'static,
    {
        let handler: StateObserver = Arc::new(handler);
        self.subscribe_inner(symbol, |shared| shared.observers.register(handler))
    }

    /// Find or start the subscription for `symbol`. `attach` runs under the
    /// map lock, before a new driver is spawned.
    fn subscribe_inner<R>(
        &self,
        symbol: &str,
        attach: impl FnOnce(&SubscriptionShared) -> R,
    ) -> Result<(SubscriptionHandle, R), StreamError> {
        let symbol = Symbol::parse(symbol)?;

        let mut subscriptions = self.inner.subscriptions.lock();
        // A closed entry may linger until its unsubscribe releases it.
        if let Some(existing) = subscriptions.get(&symbol).filter(|s| s.is_alive()) {
            let attached = attach(existing.as_ref());
            return Ok((self.handle(Arc::clone(existing)), attached));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StreamError::Configuration("subscribe requires a Tokio runtime".to_string())
        })?;

        let shared = Arc::new(SubscriptionShared::new(symbol.clone()));
        let attached = attach(shared.as_ref());

        let endpoint = self.inner.config.endpoint_for(&symbol);
        let span = tracing::info_span!("stream", symbol = %symbol, id = %shared.id);
        tracing::info!(parent: &span, %endpoint, "Subscribing");

        let ctx = DriverContext {
            shared: Arc::clone(&shared),
            transport: Arc::clone(&self.inner.transport),
            table: Arc::clone(&self.inner.table),
            endpoint,
            fallback_timeout: self.inner.config.fallback_timeout,
            reconnect: self.inner.config.reconnect.clone(),
        };
        runtime.spawn(driver::run(ctx).instrument(span));

        subscriptions.insert(symbol, Arc::clone(&shared));
        metrics::set_active_subscriptions(subscriptions.len());
        drop(subscriptions);

        Ok((self.handle(shared), attached))
    }

    /// Stop `handle`'s stream. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    /// Unsubscribe every active stream.
    pub fn shutdown(&self) {
        let active: Vec<Arc<SubscriptionShared>> =
            self.inner.subscriptions.lock().values().cloned().collect();
        for shared in active {
            self.handle(shared).unsubscribe();
        }
    }

    /// Symbols with an active subscription, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.inner.subscriptions.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Fallback table in use.
    #[must_use]
    pub fn fallback_table(&self) -> &FallbackTable {
        &self.inner.table
    }

    fn handle(&self, shared: Arc<SubscriptionShared>) -> SubscriptionHandle {
        SubscriptionHandle {
            shared,
            client: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for MarketStreamClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
