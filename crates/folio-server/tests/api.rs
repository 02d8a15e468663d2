//! HTTP surface tests against a server with no live browser sources.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use folio_core::{PortfolioSnapshot, WalletAddress};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use folio_server::config::AppConfig;
use folio_server::session::ChromeLauncher;
use folio_server::store::SnapshotStore;
use folio_server::AppState;

const SOLANA: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
const EVM: &str = "0xb77cb8f81a0f704e1e858eba57c67c072abbfcad";

fn source(enabled: bool, base_url: &str, profile: &str) -> Value {
    json!({
        "enabled": enabled,
        "base_url": base_url,
        "retries": 0,
        "retry_delay_secs": 1,
        "startup_timeout_secs": 5,
        "page_timeout_secs": 5,
        "interactive_wait_secs": 5,
        "extraction_timeout_secs": 10,
        "settle_millis": 0,
        "profile_dir": profile,
    })
}

/// Sources are disabled so no browser is ever launched.
fn test_config(dir: &TempDir) -> AppConfig {
    serde_json::from_value(json!({
        "server": { "host": "127.0.0.1", "port": 0 },
        "wallets": { "solana": [SOLANA], "evm": [EVM] },
        "scheduler": { "interval_minutes": 15, "run_on_start": false },
        "sources": {
            "solana": source(false, "https://jup.ag", "profiles/solana"),
            "evm": source(false, "https://debank.com", "profiles/evm"),
        },
        "browser": { "headless": true, "window_width": 1280, "window_height": 800 },
        "output": { "dir": dir.path() },
        "filters": { "min_usd_value": 5.0 },
    }))
    .unwrap()
}

/// Server whose EVM wallet already has a snapshot file on disk.
async fn setup() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let wallet = WalletAddress::parse(EVM).unwrap();
    SnapshotStore::new(dir.path())
        .write(&PortfolioSnapshot::new(wallet, Utc::now(), vec![]))
        .await
        .unwrap();

    let state = AppState::build(
        test_config(&dir),
        Arc::new(ChromeLauncher::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    (folio_server::app(state), dir)
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_cache() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scrape_interval_minutes"], 15);
    assert_eq!(body["cache"]["configured"]["total"], 2);
    assert_eq!(body["cache"]["cached_count"], 1);
    assert!(body["cache"]["last_update"].is_string());
    assert_eq!(body["orchestrator"]["running"], false);
}

#[tokio::test]
async fn test_cached_wallet_served() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", &format!("/api/v1/portfolio/{}", EVM)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet_address"], EVM);
    assert_eq!(body["chain"], "evm");
    assert_eq!(body["projects_count"], 0);
    assert_eq!(body["stale"], false);
}

#[tokio::test]
async fn test_query_route_trims_address() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", &format!("/portfolio?address=%20{}%20", EVM)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet_address"], EVM);
}

#[tokio::test]
async fn test_configured_but_uncached() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", &format!("/api/v1/portfolio/{}", SOLANA)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "NOT_YET_CACHED");
    assert_eq!(body["configured_addresses"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_wallet() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", "/api/v1/portfolio/0x0000000000000000000000000000000000000001").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "WALLET_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_missing_address() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "GET", "/portfolio").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PARAM");
}

#[tokio::test]
async fn test_refresh_wait_returns_report() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "POST", "/refresh?wait=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["report"]["attempted"], 0);
}

#[tokio::test]
async fn test_refresh_trigger_accepted() {
    let (app, _dir) = setup().await;
    let (status, body) = send(app, "POST", "/refresh").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["status"] == "started" || body["status"] == "already_running");
}
