// src/routes/value_area.rs
use actix_web::dev::HttpServiceFactory;
use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;

use crate::{middleware::path_logger::PathLogger, state::AppState, utils::types::ApiResponse};

const DEFAULT_RECENT: usize = 5;

#[derive(Deserialize, Debug, Default)]
pub struct ScanReq {
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// POST /api/value-area/scan
#[post("/scan")]
pub async fn scan(state: web::Data<AppState>, body: web::Json<ScanReq>) -> impl Responder {
    let symbols = match state.resolve_symbols(&body.symbols).await {
        Ok(s) if s.is_empty() => {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::err("no symbols to scan"))
        }
        Ok(s) => s,
        Err(e) => {
            log::error!("value-area scan: symbol discovery failed: {e}");
            return HttpResponse::BadGateway().json(ApiResponse::<()>::err("symbol discovery failed"));
        }
    };

    match state.scan(symbols).await {
        Ok(found) => HttpResponse::Ok().json(ApiResponse::ok(found)),
        Err(e) => {
            log::error!("value-area scan: store error: {e}");
            HttpResponse::InternalServerError().json(ApiResponse::<()>::err("store error"))
        }
    }
}

/// GET /api/value-area/recent?limit=N
#[get("/recent")]
pub async fn recent(state: web::Data<AppState>, q: web::Query<RecentQuery>) -> impl Responder {
    let limit = q.limit.unwrap_or(DEFAULT_RECENT).clamp(1, 100);
    match state.store.recent(limit).await {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::ok(rows)),
        Err(e) => {
            log::error!("value-area recent: store error: {e}");
            HttpResponse::InternalServerError().json(ApiResponse::<()>::err("store error"))
        }
    }
}

pub fn value_area_scope() -> impl HttpServiceFactory {
    web::scope("/api/value-area")
        .wrap(PathLogger)
        .service(scan)
        .service(recent)
}
