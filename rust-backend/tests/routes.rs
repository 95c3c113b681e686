// tests/routes.rs
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use fvg_screener::{
    config::settings::ScreenerConfig,
    routes::{health::health_scope, screener::screener_scope, value_area::value_area_scope},
    services::{
        fvg::{Candle, CandleSeries, Timeframe},
        market_data::CandleSource,
        sink::MemoryValueAreaStore,
    },
    state::AppState,
    utils::errors::ApiError,
};

/// Same shape for every symbol: one bullish 1h gap [97, 98] and a 5m gap
/// [97.5, 98.3] straddling its upper line. Everything else gets the 1h rows.
struct FakeExchange {
    anchor: DateTime<Utc>,
}

fn rows(start: DateTime<Utc>, step: Duration, rows: &[(f64, f64, f64, f64)]) -> CandleSeries {
    CandleSeries::new(
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                ts: start + step * i as i32,
                open,
                high,
                low,
                close,
                volume: 100.0,
            })
            .collect(),
    )
    .unwrap()
}

#[async_trait]
impl CandleSource for FakeExchange {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        _since: DateTime<Utc>,
    ) -> Result<CandleSeries, ApiError> {
        Ok(match timeframe {
            Timeframe::M5 => rows(
                self.anchor - Duration::minutes(20),
                Duration::minutes(5),
                &[(96.8, 97.5, 96.5, 97.2), (97.3, 98.4, 97.2, 98.2), (98.4, 99.0, 98.3, 98.8)],
            ),
            _ => rows(
                self.anchor - Duration::hours(6),
                Duration::hours(1),
                &[
                    (99.0, 101.0, 96.0, 100.0),
                    (96.5, 97.0, 94.0, 95.0),
                    (89.0, 96.0, 88.0, 90.0),
                    (98.5, 99.5, 98.0, 98.0),
                    (98.0, 100.0, 97.0, 99.0),
                    (100.0, 102.0, 99.0, 101.0),
                ],
            ),
        })
    }

    async fn last_price(&self, _symbol: &str) -> Result<f64, ApiError> {
        Ok(150.0)
    }
}

fn state(symbols: &[&str]) -> web::Data<AppState> {
    web::Data::new(AppState::new(
        Arc::new(FakeExchange { anchor: Utc::now() }),
        Arc::new(MemoryValueAreaStore::new()),
        ScreenerConfig::default(),
        symbols.iter().map(|s| s.to_string()).collect(),
        None,
    ))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .service(screener_scope())
                .service(value_area_scope())
                .service(health_scope()),
        )
        .await
    };
}

#[actix_rt::test]
async fn health_is_ok() {
    let st = state(&[]);
    let app = app!(st);
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn latest_is_404_before_any_run() {
    let st = state(&["BTCUSDT"]);
    let app = app!(st);
    let req = test::TestRequest::get().uri("/api/screener/latest").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "no screen has run yet");
}

#[actix_rt::test]
async fn api_routes_are_reachable_alongside_health() {
    let st = state(&["BTCUSDT"]);
    let app = app!(st);

    let req = test::TestRequest::get().uri("/api/screener/latest/summary").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::get().uri("/api/value-area/recent").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "OK");
}

#[actix_rt::test]
async fn run_then_read_latest() {
    let st = state(&["BTCUSDT", "ETHUSDT"]);
    let app = app!(st);

    let req = test::TestRequest::post()
        .uri("/api/screener/run")
        .set_json(json!({ "config": { "skip_forming_candle": false } }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_setups"], 2);
    assert_eq!(body["data"]["setups"][0]["type"], "bullish");
    assert_eq!(body["data"]["setups"][0]["stop_loss"], 97.2);

    let req = test::TestRequest::get().uri("/api/screener/latest/summary").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let summary = body["data"].as_array().unwrap();
    assert_eq!(summary.len(), 2);
    assert!(summary.iter().all(|s| s["bullish"] == 1 && s["bearish"] == 0));

    let req = test::TestRequest::get()
        .uri("/api/screener/latest?since=2100-01-01T00:00:00Z")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["total_setups"], 0);
}

#[actix_rt::test]
async fn explicit_symbols_override_the_watch_list() {
    let st = state(&["BTCUSDT", "ETHUSDT"]);
    let app = app!(st);

    let req = test::TestRequest::post()
        .uri("/api/screener/run")
        .set_json(json!({ "symbols": ["SOLUSDT"], "config": { "skip_forming_candle": false } }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["coins_analyzed"], json!(["SOLUSDT"]));
    assert_eq!(body["data"]["setups"][0]["symbol"], "SOLUSDT");
}

#[actix_rt::test]
async fn bad_requests_are_rejected() {
    let st = state(&["BTCUSDT"]);
    let app = app!(st);

    let req = test::TestRequest::post()
        .uri("/api/screener/run")
        .set_json(json!({ "config": { "workers": 0 } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // no watch list and a source without discovery
    let st = state(&[]);
    let app = app!(st);
    let req = test::TestRequest::post().uri("/api/screener/run").set_json(json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn scan_records_breakouts_for_recent() {
    let st = state(&["BTCUSDT", "ETHUSDT"]);
    let app = app!(st);

    let req = test::TestRequest::post().uri("/api/value-area/scan").set_json(json!({})).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["symbol"], "BTCUSDT");
    assert_eq!(found[0]["current_price"], 150.0);

    let req = test::TestRequest::get().uri("/api/value-area/recent?limit=1").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/value-area/recent").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}
