//! Clipsight - video analytics retrieval with caching, history and comparison.
//!
//! # API Endpoints
//!
//! - `POST /analyze` - Analyze one video URL
//! - `POST /compare` - Analyze and rank several video URLs
//! - `GET /history` - Stored snapshots and growth for a video
//! - `GET /keys/source` - Which credential would be used for a platform
//! - `POST /keys/test` - Validate a candidate credential
//! - `GET /platforms` - Platform availability for the caller
//! - `GET /health` - Health check
//!
//! Configuration is read from the environment; see [`clipsight::config`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use clipsight::aggregation::AnalyticsAggregator;
use clipsight::api::{AppState, router};
use clipsight::cache::CacheStore;
use clipsight::config::Config;
use clipsight::credentials::KeyResolver;
use clipsight::data_sources::{InstagramClient, SourceRegistry, YouTubeClient};
use clipsight::platform::PlatformResolver;
use clipsight::sentiment::SentimentEngine;
use clipsight::storage::Storage;

/// How often expired cache rows are physically removed.
const PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials are never logged at any level
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("clipsight=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        db_url = %config.database_url,
        cache = config.cache_url.is_some(),
        platforms = ?config.supported_platforms,
        "Starting clipsight server"
    );

    // Credential store
    let credentials = Storage::new(&config.database_url).await?;
    info!("Credential database initialized");

    let cache = CacheStore::connect(&config.cache_settings()).await;

    let keys = KeyResolver::new(Some(Arc::new(credentials)), config.system_keys());

    let sources = SourceRegistry::new()
        .register(Arc::new(YouTubeClient::new(config.max_comments)))
        .register(Arc::new(InstagramClient::new(config.max_comments)));

    let aggregator = Arc::new(AnalyticsAggregator::new(
        PlatformResolver::new(config.supported_platforms.iter().copied()),
        keys,
        sources,
        cache.clone(),
        SentimentEngine::new(),
        config.analytics_settings(),
    ));

    if cache.is_enabled() {
        tokio::spawn(purge_loop(cache));
    }

    let app = router(AppState::new(aggregator, config.max_compare));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Clipsight is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn purge_loop(cache: CacheStore) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        interval.tick().await;
        if let Some(removed) = cache.purge_expired().await {
            debug!(removed, "Purged expired cache rows");
        }
    }
}
