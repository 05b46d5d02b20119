//! Shared helpers for stream client integration tests.
//!
//! - `ScriptedTransport`: deterministic `FeedTransport` driven by per-symbol
//!   scripts, for paused-clock tests
//! - `FeedServer`: a real local WebSocket feed for end-to-end tests
//! - `Recorder`: collects every state an observer sees

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use live_market_stream::{
    FeedConnection, FeedTransport, StreamError, StreamState, SubscriptionHandle,
};

// =============================================================================
// Frames
// =============================================================================

/// A backend price frame.
pub fn tick(price: &str, change: &str, signal: &str) -> String {
    let emoji = match signal {
        "BUY" => "🟢",
        "SELL" => "🔴",
        _ => "🟡",
    };
    serde_json::json!({
        "symbol": "TEST",
        "price": price.parse::<f64>().unwrap(),
        "price_change_24h": change.parse::<f64>().unwrap(),
        "timestamp": "2024-05-01T12:00:00.000000",
        "signal": signal,
        "signal_emoji": emoji,
        "message": format!("{signal} advisory"),
    })
    .to_string()
}

/// A backend error frame.
pub fn feed_error(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

// =============================================================================
// Scripted Transport
// =============================================================================

/// How the connection ends once scripted frames run out.
#[derive(Debug, Clone)]
pub enum Ending {
    /// Stay open and silent.
    Hold,
    /// Peer closes.
    Close,
    /// Transport error.
    Fail(String),
}

/// Outcome of one `connect` call.
#[derive(Debug, Clone)]
pub enum ConnectScript {
    /// Fail after a delay.
    Refuse { after: Duration, reason: String },
    /// Never resolve.
    Hang,
    /// Open after a delay, deliver `(delay, frame)` pairs, then end.
    Accept {
        after: Duration,
        frames: Vec<(Duration, String)>,
        then: Ending,
    },
}

impl ConnectScript {
    pub fn refuse() -> Self {
        Self::Refuse {
            after: Duration::ZERO,
            reason: "Connection refused".to_string(),
        }
    }

    pub fn accept(frames: Vec<String>, then: Ending) -> Self {
        Self::Accept {
            after: Duration::ZERO,
            frames: frames.into_iter().map(|f| (Duration::ZERO, f)).collect(),
            then,
        }
    }
}

#[derive(Default)]
struct TransportInner {
    routes: Mutex<HashMap<String, VecDeque<ConnectScript>>>,
    endpoints: Mutex<Vec<String>>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

/// `FeedTransport` that plays back scripts keyed by symbol. A symbol with
/// no script left hangs on connect.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<TransportInner>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue scripts for successive connects to `symbol`.
    pub fn route(self, symbol: &str, scripts: impl IntoIterator<Item = ConnectScript>) -> Self {
        self.inner
            .routes
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .extend(scripts);
        self
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.inner.endpoints.lock().clone()
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, StreamError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.endpoints.lock().push(endpoint.to_string());

        let symbol = endpoint.rsplit('/').next().unwrap_or_default();
        let script = self
            .inner
            .routes
            .lock()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ConnectScript::Hang);

        match script {
            ConnectScript::Refuse { after, reason } => {
                tokio::time::sleep(after).await;
                Err(StreamError::ConnectionError(reason))
            }
            ConnectScript::Hang => std::future::pending().await,
            ConnectScript::Accept {
                after,
                frames,
                then,
            } => {
                tokio::time::sleep(after).await;
                Ok(Box::new(ScriptedConnection {
                    frames: frames.into(),
                    then,
                    closed: false,
                    closes: Arc::clone(&self.inner.closes),
                }))
            }
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<(Duration, String)>,
    then: Ending,
    closed: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Option<Result<String, StreamError>> {
        if let Some((delay, frame)) = self.frames.pop_front() {
            tokio::time::sleep(delay).await;
            return Some(Ok(frame));
        }
        match &self.then {
            Ending::Hold => std::future::pending().await,
            Ending::Close => None,
            Ending::Fail(reason) => Some(Err(StreamError::ConnectionError(reason.clone()))),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Observer Recorder
// =============================================================================

/// Records every state delivered to an observer.
#[derive(Clone, Default)]
pub struct Recorder {
    states: Arc<Mutex<Vec<StreamState>>>,
}

impl Recorder {
    pub fn attach(handle: &SubscriptionHandle) -> Self {
        let recorder = Self::default();
        let states = Arc::clone(&recorder.states);
        handle.on_state_change(move |state| states.lock().push(state.clone()));
        recorder
    }

    pub fn count(&self) -> usize {
        self.states.lock().len()
    }

    pub fn states(&self) -> Vec<StreamState> {
        self.states.lock().clone()
    }
}

// =============================================================================
// Local WebSocket Feed
// =============================================================================

/// What the local feed does with each connection.
#[derive(Debug, Clone)]
pub enum ServerScript {
    /// Send frames, then keep reading until the client goes away.
    Frames(Vec<String>),
    /// Complete the handshake and close at once.
    CloseImmediately,
}

/// Local tokio-tungstenite feed server.
pub struct FeedServer {
    pub addr: SocketAddr,
    paths: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl FeedServer {
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let task = {
            let paths = Arc::clone(&paths);
            let disconnects = Arc::clone(&disconnects);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let paths = Arc::clone(&paths);
                    let disconnects = Arc::clone(&disconnects);
                    let script = script.clone();
                    tokio::spawn(async move {
                        serve(stream, script, paths).await;
                        disconnects.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            addr,
            paths,
            disconnects,
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: tokio::net::TcpStream, script: ServerScript, paths: Arc<Mutex<Vec<String>>>) {
    let record_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        paths.lock().push(request.uri().path().to_string());
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record_path).await else {
        return;
    };

    match script {
        ServerScript::CloseImmediately => {
            let _ = ws.close(None).await;
        }
        ServerScript::Frames(frames) => {
            for frame in frames {
                if ws.send(Message::text(frame)).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
        }
    }
}

/// Reserve a local port nobody listens on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait until `predicate` holds for the handle's state, or panic after `limit`.
pub async fn wait_for(
    handle: &SubscriptionHandle,
    limit: Duration,
    predicate: impl Fn(&StreamState) -> bool,
) -> StreamState {
    let mut rx = handle.watch();
    tokio::time::timeout(limit, async {
        loop {
            let current = rx.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            if rx.changed().await.is_err() {
                panic!("state channel closed");
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("condition not met within {limit:?}: {:?}", handle.state()))
}
