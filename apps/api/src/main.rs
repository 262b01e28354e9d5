mod coaching;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::coaching::engine::CoachingEngine;
use crate::coaching::settings::CoachingSettings;
use crate::coaching::store::{
    InMemorySessionStore, PgSessionStore, RedisSessionStore, SessionStore,
};
use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Coach API v{}", env!("CARGO_PKG_VERSION"));

    let settings = CoachingSettings::load(config.coaching_config_path.as_deref())?;
    let store = build_store(&config).await?;
    let engine = CoachingEngine::new(settings, store, config.persistence)?;

    let phases = &engine.settings().phases;
    info!(
        "Coaching phases: window {} / max {} turns, thresholds {}/{}/{}",
        phases.window,
        phases.max_turns_per_phase,
        phases.thresholds.introduction,
        phases.thresholds.story_discovery,
        phases.thresholds.achievement_mining
    );

    let state = AppState {
        engine: Arc::new(engine),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connects the session backend selected by `SESSION_STORE`.
async fn build_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres session store")?;
            Arc::new(PgSessionStore::new(create_pool(url).await?))
        }
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required for the redis session store")?;
            let client = redis::Client::open(url)?;
            Arc::new(RedisSessionStore::connect(&client).await?)
        }
        StoreBackend::Memory => Arc::new(InMemorySessionStore::new()),
    };
    info!("Session store: {}", config.store.as_str());
    Ok(store)
}
