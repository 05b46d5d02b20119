//! Live Market Stream Watcher
//!
//! Subscribes to one or more symbols and logs every state change until
//! Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p live-market-stream -- btc eth
//! ```
//!
//! Symbols given on the command line override `LIVE_STREAM_SYMBOLS`.
//!
//! # Environment Variables
//!
//! - `LIVE_STREAM_WS_URL`: feed base URL (default: ws://localhost:8000)
//! - `LIVE_STREAM_PATH`: path segment before the symbol (default: ws)
//! - `LIVE_STREAM_FALLBACK_TIMEOUT_MS`: fallback timeout (default: 3000)
//! - `LIVE_STREAM_RECONNECT`: never | backoff (default: never)
//! - `LIVE_STREAM_FALLBACK_TABLE`: JSON fallback table path (default: built-in)
//! - `LIVE_STREAM_SYMBOLS`: comma-separated symbols (default: btc)
//! - `LIVE_STREAM_METRICS_PORT`: Prometheus port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: log filter (default: live_market_stream=info)

use std::time::Duration;

use anyhow::Context;
use live_market_stream::infrastructure::telemetry;
use live_market_stream::{
    MarketStreamClient, ReconnectMode, StreamClientConfig, StreamState, WatcherSettings,
    init_metrics,
};
use tokio::signal;

/// Time given to drivers to send close frames after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting live market stream watcher");

    let config = StreamClientConfig::from_env().context("invalid stream configuration")?;
    let mut settings = WatcherSettings::from_env();
    let cli_symbols: Vec<String> = std::env::args().skip(1).collect();
    if !cli_symbols.is_empty() {
        settings.symbols = cli_symbols;
    }
    log_config(&config, &settings);

    init_metrics(settings.metrics_port).context("failed to start metrics exporter")?;

    let client = MarketStreamClient::new(config).context("failed to create stream client")?;

    for raw in &settings.symbols {
        let symbol = raw.clone();
        match client.subscribe_with(raw, move |state| log_state(&symbol, state)) {
            Ok((handle, _)) => tracing::info!(symbol = %handle.symbol(), id = %handle.id(), "Watching"),
            Err(e) => tracing::error!(symbol = %raw, error = %e, "Cannot subscribe"),
        }
    }

    if client.active_symbols().is_empty() {
        anyhow::bail!("no valid symbols to watch");
    }

    await_shutdown().await;

    client.shutdown();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    tracing::info!("Watcher stopped");
    Ok(())
}

fn log_state(symbol: &str, state: &StreamState) {
    tracing::info!(
        symbol,
        price = ?state.price.as_ref().map(|p| p.price),
        change_24h = ?state.price.as_ref().map(|p| p.price_change_24h),
        signal = ?state.signal.as_ref().map(|s| s.kind),
        connected = state.connected,
        error = ?state.error,
        "State changed"
    );
}

fn log_config(config: &StreamClientConfig, settings: &WatcherSettings) {
    let reconnect = match config.reconnect {
        ReconnectMode::Never => "never",
        ReconnectMode::Backoff(_) => "backoff",
    };
    tracing::info!(
        feed_base_url = %config.feed_base_url,
        stream_path = %config.stream_path,
        fallback_timeout = ?config.fallback_timeout,
        reconnect,
        fallback_entries = config.fallback_table.len(),
        symbols = ?settings.symbols,
        metrics_port = settings.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    for dir in cwd.ancestors().skip(1) {
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
            return;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
