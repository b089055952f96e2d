//! Arbiter configuration
//!
//! Cache generation names are injected rather than global, so tests can run
//! with disposable generations. Bumping the version is the only way to force
//! a full cache invalidation.

use anyhow::Result;
use url::Url;

use common::paths::DASHBOARD;

/// Shell assets stored into the static generation on install
pub const SHELL_ASSETS: &[&str] = &[
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

/// URL substrings whose responses are never cached nor read from cache
pub const NEVER_CACHE_MARKERS: &[&str] = &["/api/", "/auth/", "/_next/data/"];

/// Offline cache arbiter configuration
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Origin the cached application is served from
    pub origin: Url,
    /// Generation holding shell assets and static files
    pub static_generation: String,
    /// Generation holding documents
    pub dynamic_generation: String,
    /// Older umbrella names kept so activation recognizes them as current
    pub legacy_generations: Vec<String>,
    /// Paths stored into the static generation on install
    pub shell_assets: Vec<String>,
    /// Path of the cached document served when a navigation cannot be answered
    pub offline_page: String,
    /// Path opened when a notification is clicked
    pub landing_page: String,
    /// URL substrings routed network-only
    pub never_cache_markers: Vec<String>,
}

impl ArbiterConfig {
    /// Configuration for cache version `version`: `static-v{n}`,
    /// `dynamic-v{n}` and the umbrella `umbrella-v{n}`
    pub fn versioned(origin: Url, version: u32) -> Self {
        Self {
            origin,
            static_generation: format!("static-v{}", version),
            dynamic_generation: format!("dynamic-v{}", version),
            legacy_generations: vec![format!("umbrella-v{}", version)],
            shell_assets: SHELL_ASSETS.iter().map(|s| s.to_string()).collect(),
            offline_page: DASHBOARD.to_string(),
            landing_page: DASHBOARD.to_string(),
            never_cache_markers: NEVER_CACHE_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every generation name that survives activation
    pub fn current_generations(&self) -> Vec<&str> {
        let mut names = vec![
            self.static_generation.as_str(),
            self.dynamic_generation.as_str(),
        ];
        names.extend(self.legacy_generations.iter().map(String::as_str));
        names
    }

    /// Resolve a path against the origin
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }
}

/// Where cache generations are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

/// Proxy process configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub arbiter: ArbiterConfig,
    /// Address the proxy listens on
    pub bind_addr: String,
    pub storage: StorageBackend,
    /// Entry cap for the memory backend, unbounded when unset
    pub memory_quota: Option<usize>,
}

impl ProxyConfig {
    /// Create a new ProxyConfig from environment variables
    ///
    /// # Environment Variables
    /// - `ARBITER_ORIGIN_URL`: Application origin (default: "http://localhost:8080")
    /// - `ARBITER_CACHE_VERSION`: Cache generation version (default: 4)
    /// - `ARBITER_BIND_ADDR`: Listen address (default: "127.0.0.1:3002")
    /// - `ARBITER_STORAGE`: `memory` or `redis` (default: "memory")
    /// - `ARBITER_MEMORY_QUOTA`: Maximum cached entries for the memory backend (optional)
    pub fn from_env() -> Result<Self> {
        let origin = std::env::var("ARBITER_ORIGIN_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let origin =
            Url::parse(&origin).map_err(|e| anyhow::anyhow!("Invalid ARBITER_ORIGIN_URL: {}", e))?;

        let version = std::env::var("ARBITER_CACHE_VERSION")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .unwrap_or(4);

        let bind_addr =
            std::env::var("ARBITER_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3002".to_string());

        let storage = match std::env::var("ARBITER_STORAGE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "redis" => StorageBackend::Redis,
            other => anyhow::bail!("Unknown ARBITER_STORAGE backend: {}", other),
        };

        let memory_quota = match std::env::var("ARBITER_MEMORY_QUOTA") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid ARBITER_MEMORY_QUOTA: {}", e))?,
            ),
            Err(_) => None,
        };

        Ok(ProxyConfig {
            arbiter: ArbiterConfig::versioned(origin, version),
            bind_addr,
            storage,
            memory_quota,
        })
    }
}
