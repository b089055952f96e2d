//! Common library for the Fitout gateway
//!
//! This crate provides the vocabulary shared by the request gate and the
//! offline cache arbiter: well-known paths, auth cookie names, the session
//! model with its role claim, and the cache storage used by the arbiter.

pub mod cache;
pub mod error;
pub mod paths;
pub mod session;

/// Example usage of the cache storage
///
/// ```rust,no_run
/// use common::cache::{CacheStorage, MemoryCacheStorage, StoredResponse, request_key};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storage = MemoryCacheStorage::new();
///     let key = request_key("https://app.example.com/icons/icon-192x192.png");
///     storage
///         .put("static-v4", &key, StoredResponse::new(200, vec![], b"png".to_vec()))
///         .await?;
///     println!("generations: {:?}", storage.keys().await?);
///     Ok(())
/// }
/// ```
pub fn example_usage() {}
