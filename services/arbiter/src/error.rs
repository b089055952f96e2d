//! Custom error types for the arbiter

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use common::error::CacheError;

/// The network could not produce a response
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("Network request failed: {0}")]
    Unavailable(String),

    /// Request could not be expressed on the wire
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            NetworkError::InvalidRequest(e.to_string())
        } else {
            NetworkError::Unavailable(e.to_string())
        }
    }
}

/// Custom error type for the arbiter
#[derive(Error, Debug)]
pub enum ArbiterError {
    /// A shell asset could not be fetched during install
    #[error("Failed to fetch shell asset {asset}: {source}")]
    InstallFetch {
        asset: String,
        #[source]
        source: NetworkError,
    },

    /// A shell asset answered with a non-200 status during install
    #[error("Shell asset {asset} answered {status}")]
    InstallStatus { asset: String, status: u16 },

    /// Cache storage failed during a lifecycle step
    #[error("Cache storage error: {0}")]
    Cache(#[from] CacheError),

    /// A URL could not be parsed or joined
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A stored response could not be rebuilt
    #[error("Invalid stored response: {0}")]
    StoredResponse(String),
}

/// Type alias for arbiter results
pub type ArbiterResult<T> = Result<T, ArbiterError>;

/// Errors surfaced by the proxy routes
#[derive(Error, Debug)]
pub enum ProxyError {
    /// A bypassed request could not reach the origin
    #[error("Origin unreachable: {0}")]
    Origin(#[from] NetworkError),

    /// Incoming request body could not be read
    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// Origin URL could not be built
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ProxyError::Origin(_) => (StatusCode::BAD_GATEWAY, "Origin unavailable"),
            ProxyError::Body(_) => (StatusCode::BAD_REQUEST, "Invalid request body"),
            ProxyError::Url(_) => (StatusCode::BAD_REQUEST, "Invalid request path"),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
