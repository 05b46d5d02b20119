//! WebSocket Feed Tests
//!
//! End-to-end runs against a local tokio-tungstenite server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use common::{FeedServer, ServerScript, tick, unused_port, wait_for};
use live_market_stream::{MarketStreamClient, SignalType, StreamClientConfig, StreamPhase};

const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn live_frames_reach_the_handle() {
    let server = FeedServer::start(ServerScript::Frames(vec![tick("3500", "1.1", "BUY")])).await;
    let client = MarketStreamClient::new(StreamClientConfig::new(server.ws_url())).unwrap();
    let eth = client.subscribe("ETH").unwrap();

    let state = wait_for(&eth, LIMIT, |s| s.price.is_some()).await;
    assert_eq!(state.price.unwrap().price, Decimal::from_str("3500").unwrap());
    assert_eq!(state.signal.unwrap().kind, SignalType::Buy);
    assert!(state.connected);
    assert_eq!(eth.phase(), StreamPhase::Live);
    assert_eq!(server.paths(), vec!["/ws/eth"]);
}

#[tokio::test]
async fn refused_connection_falls_back() {
    let config = StreamClientConfig::new(format!("ws://127.0.0.1:{}", unused_port()));
    let client = MarketStreamClient::new(config).unwrap();
    let btc = client.subscribe("btc").unwrap();

    let state = wait_for(&btc, LIMIT, |s| s.connected).await;
    assert_eq!(state.price.unwrap().price, Decimal::new(64230, 0));
    assert_eq!(state.signal.unwrap().kind, SignalType::Hold);
    assert!(state.error.is_some());
    assert_eq!(btc.phase(), StreamPhase::Degraded);
}

#[tokio::test]
async fn server_close_before_data_falls_back_on_timer() {
    let server = FeedServer::start(ServerScript::CloseImmediately).await;
    let config = StreamClientConfig::new(server.ws_url())
        .with_fallback_timeout(Duration::from_millis(300));
    let client = MarketStreamClient::new(config).unwrap();
    let btc = client.subscribe("btc").unwrap();

    let state = wait_for(&btc, LIMIT, |s| s.connected).await;
    assert_eq!(state.signal.unwrap().kind, SignalType::Hold);
    assert!(state.error.is_none());
    assert_eq!(btc.phase(), StreamPhase::Live);
}

#[tokio::test]
async fn unsubscribe_disconnects_from_server() {
    let server = FeedServer::start(ServerScript::Frames(vec![tick("145", "5.4", "HOLD")])).await;
    let client = MarketStreamClient::new(StreamClientConfig::new(server.ws_url())).unwrap();
    let sol = client.subscribe("sol").unwrap();

    wait_for(&sol, LIMIT, |s| s.price.is_some()).await;
    sol.unsubscribe();

    tokio::time::timeout(LIMIT, async {
        while server.disconnects() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sol.phase(), StreamPhase::Closed);
    assert!(client.active_symbols().is_empty());
}
