//! Cache storage for the offline arbiter
//!
//! Responses are kept inside named cache generations (`static-v4`,
//! `dynamic-v4`, ...). A generation is only ever removed as a whole; single
//! entries are never expired by age. Two backends are provided: an in-process
//! map shared by every clone, and Redis.

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};

/// Response snapshot stored inside a cache generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Build the storage key of a GET request for `url`
///
/// Only GET requests are ever stored, so the method is fixed.
pub fn request_key(url: &str) -> String {
    format!("GET {}", url)
}

/// Process-wide storage of named cache generations
///
/// There is no locking across operations: the last writer wins for a key.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every existing generation
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Create the generation if it does not exist yet
    async fn open(&self, name: &str) -> CacheResult<()>;

    /// Delete a generation with all its entries, returning whether it existed
    async fn delete(&self, name: &str) -> CacheResult<bool>;

    /// Look up one entry inside a generation
    async fn match_in(&self, name: &str, key: &str) -> CacheResult<Option<StoredResponse>>;

    /// Store an entry, creating the generation on demand
    async fn put(&self, name: &str, key: &str, response: StoredResponse) -> CacheResult<()>;
}

type Generations = BTreeMap<String, HashMap<String, StoredResponse>>;

/// In-process cache storage
///
/// Clones share the same underlying map, so a new arbiter built over a clone
/// sees everything an earlier one stored. An optional quota caps the number
/// of entries across all generations; writes of new keys past it are
/// rejected, overwrites are always accepted.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    generations: Arc<RwLock<Generations>>,
    quota: Option<usize>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding at most `max_entries` entries
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            quota: Some(max_entries),
            ..Self::default()
        }
    }

    /// Number of entries held by a generation
    pub async fn len(&self, name: &str) -> usize {
        self.generations
            .read()
            .await
            .get(name)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }

    async fn open(&self, name: &str) -> CacheResult<()> {
        self.generations
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        Ok(self.generations.write().await.remove(name).is_some())
    }

    async fn match_in(&self, name: &str, key: &str) -> CacheResult<Option<StoredResponse>> {
        Ok(self
            .generations
            .read()
            .await
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &str, response: StoredResponse) -> CacheResult<()> {
        let mut generations = self.generations.write().await;

        if let Some(quota) = self.quota {
            let overwrite = generations
                .get(name)
                .is_some_and(|entries| entries.contains_key(key));
            let used: usize = generations.values().map(HashMap::len).sum();
            if !overwrite && used >= quota {
                return Err(CacheError::Rejected(format!(
                    "quota of {} entries exceeded",
                    quota
                )));
            }
        }

        generations
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }
}

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> anyhow::Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Ok(RedisConfig { url })
    }
}

const GENERATIONS_KEY: &str = "cache:generations";

/// Transactions tried before a delete racing with writers gives up
const DELETE_ATTEMPTS: usize = 8;

/// Redis-backed cache storage
///
/// Layout: the set `cache:generations` lists generation names, the set
/// `cache:<gen>:keys` indexes the request keys of a generation, and each entry
/// is a hash `cache:<gen>:entry:<key>` with `status`, `headers` and `body`.
#[derive(Clone)]
pub struct RedisCacheStorage {
    client: Client,
}

impl RedisCacheStorage {
    /// Initialize a new Redis-backed storage
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis cache storage initialized with URL: {}", config.url);
        Ok(RedisCacheStorage { client })
    }

    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    fn index_key(name: &str) -> String {
        format!("cache:{}:keys", name)
    }

    fn entry_key(name: &str, key: &str) -> String {
        format!("cache:{}:entry:{}", name, key)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl CacheStorage for RedisCacheStorage {
    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let mut names: Vec<String> = conn.smembers(GENERATIONS_KEY).await?;
        names.sort();
        Ok(names)
    }

    async fn open(&self, name: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.sadd(GENERATIONS_KEY, name).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let index = Self::index_key(name);

        for _ in 0..DELETE_ATTEMPTS {
            // A put indexing a new key before EXEC aborts the transaction
            let _: () = redis::cmd("WATCH")
                .arg(&index)
                .arg(GENERATIONS_KEY)
                .query_async(&mut conn)
                .await?;

            let exists: bool = conn.sismember(GENERATIONS_KEY, name).await?;
            if !exists {
                let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                return Ok(false);
            }
            let keys: Vec<String> = conn.smembers(&index).await?;

            let mut pipe = redis::pipe();
            pipe.atomic();
            for key in &keys {
                pipe.del(Self::entry_key(name, key)).ignore();
            }
            pipe.del(&index).ignore();
            pipe.srem(GENERATIONS_KEY, name);

            let committed: Option<(i64,)> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                info!("Deleted cache generation {} ({} entries)", name, keys.len());
                return Ok(true);
            }
            debug!("Cache generation {} changed during delete, retrying", name);
        }

        Err(CacheError::Rejected(format!(
            "cache generation {} kept changing during delete",
            name
        )))
    }

    async fn match_in(&self, name: &str, key: &str) -> CacheResult<Option<StoredResponse>> {
        let mut conn = self.get_connection().await?;
        let fields: HashMap<String, Vec<u8>> = conn.hgetall(Self::entry_key(name, key)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status = fields
            .get("status")
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|raw| raw.parse::<u16>().ok())
            .ok_or_else(|| CacheError::Corrupted(format!("missing status for {}", key)))?;
        let headers = match fields.get("headers") {
            Some(raw) => serde_json::from_slice(raw)?,
            None => Vec::new(),
        };
        let body = fields.get("body").cloned().unwrap_or_default();

        Ok(Some(StoredResponse {
            status,
            headers,
            body,
        }))
    }

    async fn put(&self, name: &str, key: &str, response: StoredResponse) -> CacheResult<()> {
        let headers = serde_json::to_vec(&response.headers)?;
        let entry = Self::entry_key(name, key);
        let mut conn = self.get_connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .hset(&entry, "status", response.status)
            .ignore()
            .hset(&entry, "headers", headers)
            .ignore()
            .hset(&entry, "body", response.body)
            .ignore()
            .sadd(Self::index_key(name), key)
            .ignore()
            .sadd(GENERATIONS_KEY, name)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}
