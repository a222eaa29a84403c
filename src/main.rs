use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use moodreel_api::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{self, Cache, CacheWriterHandle, PgStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (cache, cache_handle) = connect_cache(&config).await;

    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database_url, config.db_max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            let store = Arc::new(PgStore::new(pool));
            AppState::new(store.clone(), store, cache, &config)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data will not survive a restart");
            let store = Arc::new(db::MemoryStore::new());
            AppState::new(store.clone(), store, cache, &config)
        }
    };

    let app = create_router(state).layer(CorsLayer::permissive());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, backend = ?config.store_backend, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Recommendation caching is optional; an unreachable Redis only disables it
async fn connect_cache(config: &Config) -> (Option<Cache>, Option<CacheWriterHandle>) {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, recommendation cache disabled");
        return (None, None);
    };

    match Cache::connect(url).await {
        Ok((cache, handle)) => (Some(cache), Some(handle)),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, recommendation cache disabled");
            (None, None)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
