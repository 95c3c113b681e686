use std::{sync::Arc, time::Duration};

use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use fvg_screener::{
    config::settings::Settings,
    db::redis::RedisPool,
    routes::{health::health_scope, screener::screener_scope, value_area::value_area_scope},
    services::{
        candle_cache::{CachedSource, CandleCache, MemoryCandleCache, RedisCandleCache},
        market_data::{BinanceSource, CandleSource},
        scheduler,
        sink::{JsonFileSink, MemoryValueAreaStore, PgValueAreaStore, ValueAreaStore},
    },
    state::AppState,
};

/// Redis keeps candles at most this long regardless of the staleness policy.
const REDIS_EXPIRE_SECS: u64 = 6 * 60 * 60;

fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
        .init();
}

async fn candle_cache(settings: &Settings) -> Arc<dyn CandleCache> {
    if let Some(url) = &settings.redis_url {
        match RedisPool::new(url).await {
            Ok(pool) => {
                log::info!("candle cache: redis");
                return Arc::new(RedisCandleCache::new(pool, REDIS_EXPIRE_SECS));
            }
            Err(e) => log::warn!("redis unavailable ({e}), caching candles in memory"),
        }
    }
    Arc::new(MemoryCandleCache::new())
}

async fn value_area_store(settings: &Settings) -> Arc<dyn ValueAreaStore> {
    if let Some(url) = &settings.database_url {
        let connected = match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => PgValueAreaStore::connect(pool).await,
            Err(e) => Err(e.into()),
        };
        match connected {
            Ok(store) => {
                log::info!("value-area store: postgres");
                return Arc::new(store);
            }
            Err(e) => log::warn!("postgres unavailable ({e}), keeping value-area results in memory"),
        }
    }
    Arc::new(MemoryValueAreaStore::new())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    log::info!("Starting FVG screener backend…");

    let settings = Settings::new().unwrap_or_else(|e| {
        eprintln!("Failed to load settings: {e}");
        std::process::exit(1);
    });
    let port = settings.server_port;

    let binance: Arc<dyn CandleSource> = Arc::new(BinanceSource::new(settings.market));
    let source: Arc<dyn CandleSource> = Arc::new(CachedSource::new(
        binance,
        candle_cache(&settings).await,
        settings.screener.cache_policy,
    ));

    let state = web::Data::new(AppState::new(
        source,
        value_area_store(&settings).await,
        settings.screener.clone(),
        settings.symbols.clone(),
        Some(JsonFileSink::new(&settings.results_dir)),
    ));

    // --- periodic jobs ------------------------------------------------------
    if settings.screen_interval_secs > 0 {
        let every = Duration::from_secs(settings.screen_interval_secs);

        let st = state.clone();
        scheduler::spawn_periodic("screen", every, move || {
            let st = st.clone();
            async move {
                let symbols = st.resolve_symbols(&[]).await?;
                st.screen(symbols, st.config.clone(), None).await;
                Ok::<(), anyhow::Error>(())
            }
        });

        let st = state.clone();
        scheduler::spawn_periodic("value-area", every, move || {
            let st = st.clone();
            async move {
                let symbols = st.resolve_symbols(&[]).await?;
                st.scan(symbols).await?;
                Ok::<(), anyhow::Error>(())
            }
        });
    }

    let server = HttpServer::new({
        let state = state.clone();
        move || {
            App::new()
                .wrap(Logger::default())
                .app_data(state.clone())
                .service(screener_scope())
                .service(value_area_scope())
                // empty-prefix scope matches every path, so it goes last
                .service(health_scope())
        }
    })
        .bind(("0.0.0.0", port))?
        .run()
        .await;

    state.stop.stop();
    scheduler::cancel("screen");
    scheduler::cancel("value-area");
    server
}
