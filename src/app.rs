/*
 * Responsibility
 * - Config読み込み → 依存生成 (Authorizer / HoldingStore / PriceSource) → Router 組み立て
 * - Middleware の適用 (HTTP 共通 / 認証は api::v1::routes 側)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::repos::{HoldingStore, MemoryHoldingStore, PgHoldingStore};
use crate::services::auth::build_authorizer;
use crate::services::market::PolygonPriceSource;
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins, e.g. RUST_LOG=info,portfolio_api=debug,tower_http=debug
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: crash the whole process so it gets noticed
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let authorizer = build_authorizer(&config.auth).context("build authorizer")?;

    let holdings: Arc<dyn HoldingStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("connect to DATABASE_URL")?;
            let store = PgHoldingStore::new(db);
            store
                .ensure_schema()
                .await
                .context("create holdings table")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; holdings are kept in memory");
            Arc::new(MemoryHoldingStore::new())
        }
    };

    let prices = PolygonPriceSource::new(
        config.prices.base_url.clone(),
        config.prices.api_key.clone(),
        config.prices.fetch_timeout,
    )
    .context("build price client")?;

    Ok(AppState::new(authorizer, holdings, Arc::new(prices)))
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes(state.clone()))
        .fallback(|| async { AppError::not_found("route") })
        .with_state(state);

    middleware::http::apply(router, config.request_timeout)
}
