//! Custom error types for the gate service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure to resolve or verify a session
#[derive(Error, Debug)]
pub enum AuthError {
    /// Auth cookie present but not decodable
    #[error("Malformed auth cookie: {0}")]
    MalformedCookie(String),

    /// Access token failed signature or claim validation
    #[error("Invalid access token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    /// Access token expired and no refresh token is available
    #[error("Access token expired")]
    Expired,

    /// Auth provider rejected the refresh token
    #[error("Token refresh rejected: {0}")]
    Refresh(String),

    /// Auth provider could not be reached
    #[error("Auth provider unreachable: {0}")]
    Provider(#[from] reqwest::Error),
}

/// Custom error type for the gate service
#[derive(Error, Debug)]
pub enum GateError {
    /// Page renderer could not be reached
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Incoming request body could not be read
    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// Upstream URL could not be built
    #[error("Invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            GateError::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream unavailable"),
            GateError::Body(_) => (StatusCode::BAD_REQUEST, "Invalid request body"),
            GateError::Url(_) => (StatusCode::BAD_REQUEST, "Invalid request path"),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
