use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use arbiter::{
    arbiter::Arbiter,
    config::{ProxyConfig, StorageBackend},
    host::TracingHost,
    network::HttpNetwork,
    server::{AppState, create_router},
};
use common::cache::{CacheStorage, MemoryCacheStorage, RedisCacheStorage, RedisConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .init();

    info!("Starting offline cache arbiter");

    let config = ProxyConfig::from_env()?;

    let storage: Arc<dyn CacheStorage> = match config.storage {
        StorageBackend::Memory => match config.memory_quota {
            Some(quota) => Arc::new(MemoryCacheStorage::with_quota(quota)),
            None => Arc::new(MemoryCacheStorage::new()),
        },
        StorageBackend::Redis => {
            let redis = RedisCacheStorage::new(&RedisConfig::from_env()?).await?;
            redis.health_check().await?;
            Arc::new(redis)
        }
    };

    let arbiter = Arbiter::new(
        config.arbiter.clone(),
        storage,
        Arc::new(HttpNetwork::new()?),
        Arc::new(TracingHost),
    );

    // A failed install leaves the previous generations serving
    if let Err(e) = arbiter.install().await {
        warn!("Install failed: {}", e);
    }
    let deleted = arbiter.activate().await?;
    info!("Activated, removed {} stale cache generations", deleted.len());

    let app = create_router(AppState {
        arbiter: Arc::new(arbiter),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(
        "Offline cache arbiter listening on {}, origin {}",
        config.bind_addr, config.arbiter.origin
    );

    axum::serve(listener, app).await?;

    Ok(())
}
