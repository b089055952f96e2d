//! Offline cache arbiter
//!
//! Every intercepted request is classified by the [`StrategyTable`] and then
//! answered by exactly one strategy. Cache writes made on the way are
//! fire-and-forget: the response is released immediately and the write runs
//! on the arbiter's task tracker, where a failure is logged and dropped.

use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::{
    config::ArbiterConfig,
    host::WorkerHost,
    network::Network,
    request::{FetchRequest, FetchResponse},
    rules::{Strategy, StrategyTable},
};
use common::cache::{CacheStorage, request_key};

/// Result of intercepting a request
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not intercepted, the caller talks to the network itself
    Bypass,
    Respond(FetchResponse),
    /// Neither network nor cache produced a response
    Failed,
}

pub struct Arbiter {
    pub(crate) config: ArbiterConfig,
    table: StrategyTable,
    pub(crate) storage: Arc<dyn CacheStorage>,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) host: Arc<dyn WorkerHost>,
    writes: TaskTracker,
}

impl Arbiter {
    pub fn new(
        config: ArbiterConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        let table = StrategyTable::standard(config.never_cache_markers.clone());
        Self {
            config,
            table,
            storage,
            network,
            host,
            writes: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn strategy_for(&self, request: &FetchRequest) -> Strategy {
        self.table.classify(request)
    }

    /// Answer an intercepted request
    pub async fn handle_fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let strategy = self.strategy_for(request);
        debug!("{} {} -> {:?}", request.method, request.url, strategy);

        match strategy {
            Strategy::Bypass => FetchOutcome::Bypass,
            Strategy::NetworkOnly => FetchOutcome::Respond(self.network_only(request).await),
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirstWithFallback => {
                FetchOutcome::Respond(self.network_first_with_fallback(request).await)
            }
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Wait until every pending cache write has finished
    pub async fn settle(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    async fn network_only(&self, request: &FetchRequest) -> FetchResponse {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Network-only request to {} failed: {}", request.url, e);
                FetchResponse::offline_json()
            }
        }
    }

    async fn cache_first(&self, request: &FetchRequest) -> FetchOutcome {
        let key = request.cache_key();
        if let Some(cached) = self.match_in(&self.config.static_generation, &key).await {
            return FetchOutcome::Respond(cached);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_storable(request, &response) {
                    self.store(&self.config.static_generation, key, &response);
                }
                FetchOutcome::Respond(response)
            }
            Err(e) => {
                warn!("Static asset {} unavailable: {}", request.url, e);
                FetchOutcome::Failed
            }
        }
    }

    async fn network_first_with_fallback(&self, request: &FetchRequest) -> FetchResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                if is_storable(request, &response) {
                    self.store(&self.config.dynamic_generation, request.cache_key(), &response);
                }
                response
            }
            Err(e) => {
                warn!("Document {} unavailable, serving from cache: {}", request.url, e);
                if let Some(cached) = self.lookup(&request.cache_key()).await {
                    return cached;
                }
                self.offline_page().await
            }
        }
    }

    async fn network_first(&self, request: &FetchRequest) -> FetchOutcome {
        match self.network.fetch(request).await {
            Ok(response) => FetchOutcome::Respond(response),
            Err(e) => {
                debug!("Request to {} failed, trying cache: {}", request.url, e);
                match self.lookup(&request.cache_key()).await {
                    Some(cached) => FetchOutcome::Respond(cached),
                    None => FetchOutcome::Failed,
                }
            }
        }
    }

    /// The cached offline page, or a synthesized one
    async fn offline_page(&self) -> FetchResponse {
        match self.config.resolve(&self.config.offline_page) {
            Ok(url) => {
                if let Some(cached) = self.lookup(&request_key(url.as_str())).await {
                    return cached;
                }
            }
            Err(e) => warn!("Invalid offline page {}: {}", self.config.offline_page, e),
        }
        FetchResponse::offline_page()
    }

    /// Look a key up across every current generation
    async fn lookup(&self, key: &str) -> Option<FetchResponse> {
        for name in self.config.current_generations() {
            if let Some(response) = self.match_in(name, key).await {
                return Some(response);
            }
        }
        None
    }

    /// Storage failures read as a miss
    async fn match_in(&self, name: &str, key: &str) -> Option<FetchResponse> {
        let stored = match self.storage.match_in(name, key).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!("Cache lookup in {} failed: {}", name, e);
                return None;
            }
        };

        match FetchResponse::from_stored(stored) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Discarding cached entry {} in {}: {}", key, name, e);
                None
            }
        }
    }

    fn store(&self, name: &str, key: String, response: &FetchResponse) {
        let storage = Arc::clone(&self.storage);
        let name = name.to_string();
        let stored = response.to_stored();

        self.writes.spawn(async move {
            if let Err(e) = storage.put(&name, &key, stored).await {
                warn!("Cache write of {} into {} failed: {}", key, name, e);
            }
        });
    }
}

/// Only complete HTTP(S) responses are written
fn is_storable(request: &FetchRequest, response: &FetchResponse) -> bool {
    response.status.as_u16() == 200 && request.is_http()
}
