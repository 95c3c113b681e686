// src/routes/screener.rs
use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{middleware::path_logger::PathLogger, state::AppState, utils::types::ApiResponse};

#[derive(Deserialize, Debug, Default)]
pub struct RunReq {
    /// Symbols to screen; falls back to the configured watch list.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Partial `ScreenerConfig` applied over the server defaults.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    /// Screen the fine timeframe as of this instant instead of now.
    #[serde(default)]
    pub fine_until: Option<DateTime<Utc>>,
    /// Trim the returned setups to fine gaps formed at or after this instant.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
pub struct LatestQuery {
    /// Only setups whose fine gap formed at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// POST /api/screener/run
#[post("/run")]
pub async fn run_screen(state: web::Data<AppState>, body: web::Json<RunReq>) -> impl Responder {
    let cfg = match &body.config {
        Some(patch) => match state.config.with_overrides(patch) {
            Ok(c) => c,
            Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::err(e)),
        },
        None => state.config.clone(),
    };

    let symbols = match state.resolve_symbols(&body.symbols).await {
        Ok(s) if s.is_empty() => {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::err("no symbols to screen"))
        }
        Ok(s) => s,
        Err(e) => {
            log::error!("run_screen: symbol discovery failed: {e}");
            return HttpResponse::BadGateway().json(ApiResponse::<()>::err("symbol discovery failed"));
        }
    };

    let report = state.screen(symbols, cfg, body.fine_until).await;
    let report = match body.since {
        Some(since) => report.filtered_since(since),
        None => report,
    };
    HttpResponse::Ok().json(ApiResponse::ok(report))
}

/// GET /api/screener/latest
#[get("/latest")]
pub async fn latest(state: web::Data<AppState>, q: web::Query<LatestQuery>) -> impl Responder {
    match state.latest.read().await.as_ref() {
        Some(r) => {
            let r = match q.since {
                Some(since) => r.filtered_since(since),
                None => r.clone(),
            };
            HttpResponse::Ok().json(ApiResponse::ok(r))
        }
        None => HttpResponse::NotFound().json(ApiResponse::<()>::err("no screen has run yet")),
    }
}

/// GET /api/screener/latest/summary
#[get("/latest/summary")]
pub async fn latest_summary(state: web::Data<AppState>) -> impl Responder {
    match state.latest.read().await.as_ref() {
        Some(r) => HttpResponse::Ok().json(ApiResponse::ok(r.summary())),
        None => HttpResponse::NotFound().json(ApiResponse::<()>::err("no screen has run yet")),
    }
}

pub fn screener_scope() -> impl HttpServiceFactory {
    web::scope("/api/screener")
        .wrap(PathLogger)
        .service(run_screen)
        .service(latest_summary)
        .service(latest)
}
