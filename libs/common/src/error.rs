//! Custom error types for the common library
//!
//! This module defines the errors raised by the cache storage backends.

use redis::RedisError;
use thiserror::Error;

/// Custom error type for cache storage operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Error returned by the Redis backend
    #[error("Cache backend error: {0}")]
    Backend(#[from] RedisError),

    /// A stored entry could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored entry is structurally invalid
    #[error("Corrupted cache entry: {0}")]
    Corrupted(String),

    /// The storage refused the operation (quota exceeded, contended delete)
    #[error("Cache storage rejected the operation: {0}")]
    Rejected(String),
}

/// Type alias for Result with CacheError
pub type CacheResult<T> = Result<T, CacheError>;
