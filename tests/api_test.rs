use axum::http::StatusCode;
use levsim::api;
use levsim::config::Config;
use levsim::datasource::{DataSourceError, MarketDataProvider, MockMarketData};
use levsim::db::init_db;
use levsim::domain::{Candle, Decimal, TimeMs};
use levsim::Repository;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    pool: SqlitePool,
    _temp: TempDir,
}

fn test_config(db_path: String) -> Config {
    Config {
        port: 0,
        database_path: db_path,
        market_data_url: "http://example.invalid".to_string(),
        market_symbols: vec!["BTCUSDT".to_string()],
        candle_interval: "1d".to_string(),
        candle_count: 10,
        market_history_start_ms: 0,
        initial_reveal: 1,
        starting_balance: Decimal::from(1000_i64),
        next_day_uses: 3,
        guest_next_day_uses: 2,
        default_retry_tokens: 1,
        daily_token_floor: 3,
        max_leverage: 100,
        referral_reward: 3,
    }
}

fn candles() -> Vec<Candle> {
    ["100", "100", "110", "120", "90", "95"]
        .iter()
        .enumerate()
        .map(|(i, px)| {
            let px = Decimal::from_str_canonical(px).unwrap();
            Candle::new(TimeMs::new(i as i64 * 86_400_000), px, px, px, px)
        })
        .collect()
}

async fn setup_test_app(market: Arc<dyn MarketDataProvider>) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool.clone()));

    let state = api::AppState::new(repo, test_config(db_path), market);
    TestApp {
        app: api::create_router(state),
        pool,
        _temp: temp_dir,
    }
}

async fn default_app() -> TestApp {
    setup_test_app(Arc::new(MockMarketData::new().with_series(candles()))).await
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn send(app: &axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_and_ready() {
    let t = default_app().await;
    let (status, body) = get(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(&t.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_full_round_over_http() {
    let t = default_app().await;

    let (status, body) = get(&t.app, "/v1/game?owner=alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, view) = post(&t.app, "/v1/game/start", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "setup");
    assert_eq!(view["balance"], "1000");
    assert_eq!(view["revealIndex"], 1);
    assert_eq!(view["candleCount"], 6);
    assert_eq!(view["candles"].as_array().unwrap().len(), 2);
    assert_eq!(view["nextDayUsesRemaining"], 3);

    let (status, body) = post(
        &t.app,
        "/v1/game/open",
        json!({"owner": "alice", "side": "long", "leverage": 2, "marginPct": "50"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["notionalSize"], "1000");
    assert_eq!(body["session"]["status"], "active");

    let (status, body) = post(&t.app, "/v1/game/next-day", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["kind"], "advanced");
    assert_eq!(body["session"]["position"]["unrealizedPnl"], "100");
    assert_eq!(body["session"]["candles"].as_array().unwrap().len(), 3);

    let (status, body) = post(
        &t.app,
        "/v1/game/scale-in",
        json!({"owner": "alice", "side": "short", "marginPct": "10"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("long"));

    let (status, body) = post(
        &t.app,
        "/v1/game/close",
        json!({"owner": "alice", "percent": "50"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["realizedPnl"], "50");
    assert_eq!(body["session"]["balance"], "1050");

    post(&t.app, "/v1/game/next-day", json!({"owner": "alice"})).await;
    let (status, body) = post(&t.app, "/v1/game/next-day", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["kind"], "ended");
    assert_eq!(body["session"]["status"], "ended");
    assert!(body["session"]["position"].is_null());

    let (status, _) = post(&t.app, "/v1/game/next-day", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_restart_spends_token_over_http() {
    let t = default_app().await;
    post(&t.app, "/v1/game/start", json!({"owner": "bob"})).await;

    let (status, body) = post(&t.app, "/v1/game/restart", json!({"owner": "bob"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokensLeft"], 0);
    assert_eq!(body["session"]["status"], "setup");

    let (status, _) = post(&t.app, "/v1/game/restart", json!({"owner": "bob"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post(
        &t.app,
        "/v1/tokens/ad-watch",
        json!({"owner": "bob", "adWatched": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["retryTokens"], 1);

    let (status, _) = post(&t.app, "/v1/game/restart", json!({"owner": "bob"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&t.app, "/v1/tokens/events?owner=bob").await;
    assert_eq!(status, StatusCode::OK);
    let reasons: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["reason"].as_str().unwrap())
        .collect();
    assert_eq!(
        reasons,
        vec![
            "restart_consumption",
            "ad_watch",
            "restart_consumption",
            "signup_bonus"
        ]
    );
}

#[tokio::test]
async fn test_guest_allowance_and_bad_owner() {
    let t = default_app().await;
    let (status, view) = post(&t.app, "/v1/game/start", json!({"owner": "guest:abc"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["nextDayUsesRemaining"], 2);

    let (status, _) = post(&t.app, "/v1/game/start", json!({"owner": "has space"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tokens_and_referrals_over_http() {
    let t = default_app().await;

    let (status, account) = get(&t.app, "/v1/tokens?owner=carol").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["retryTokens"], 1);

    let (status, body) = get(&t.app, "/v1/referrals/code?owner=carol").await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code, account["referralCode"].as_str().unwrap());

    let (status, body) = post(
        &t.app,
        "/v1/referrals/redeem",
        json!({"owner": "dan", "code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referrerId"], "carol");

    let (status, _) = post(
        &t.app,
        "/v1/referrals/redeem",
        json!({"owner": "dan", "code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(
        &t.app,
        "/v1/referrals/redeem",
        json!({"owner": "erin", "code": "ZZZZ"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, account) = get(&t.app, "/v1/tokens?owner=dan").await;
    assert_eq!(account["retryTokens"], 4);

    let (status, body) = post(&t.app, "/v1/tokens/daily", json!({"owner": "erin"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], 2);
    assert_eq!(body["retryTokens"], 3);
    let (status, _) = post(&t.app, "/v1/tokens/daily", json!({"owner": "erin"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(
        &t.app,
        "/v1/tokens/ad-watch",
        json!({"owner": "erin", "adWatched": false}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_market_outage_is_503() {
    let market = Arc::new(MockMarketData::failing(DataSourceError::HttpError {
        status: 502,
        message: "Server error".to_string(),
    }));
    let t = setup_test_app(market).await;

    let (status, body) = post(&t.app, "/v1/game/start", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("market data"));
}

#[tokio::test]
async fn test_corrupt_session_row_is_500() {
    let t = default_app().await;
    let (status, _) = post(&t.app, "/v1/game/start", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::OK);

    sqlx::query("UPDATE game_sessions SET state_json = '{\"garbage\":1}' WHERE owner_id = 'alice'")
        .execute(&t.pool)
        .await
        .unwrap();

    let (status, body) = get(&t.app, "/v1/game?owner=alice").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("corrupt"));

    let (status, _) = post(&t.app, "/v1/game/next-day", json!({"owner": "alice"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
