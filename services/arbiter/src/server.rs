//! Caching proxy routes
//!
//! Every request that does not hit a worker event endpoint is turned into a
//! [`FetchRequest`] against the origin and handed to the arbiter.

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::warn;

use crate::{
    arbiter::{Arbiter, FetchOutcome},
    error::ProxyError,
    host::Notification,
    request::{FetchRequest, FetchResponse, RequestMode},
};

/// Largest request body accepted by the proxy
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub arbiter: Arc<Arbiter>,
}

/// Create the router for the caching proxy
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/__worker/push", post(push_event))
        .route("/__worker/notification-click", post(notification_click))
        .fallback(intercept)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "arbiter-service"
    }))
}

fn into_response(response: FetchResponse) -> Response {
    (response.status, response.headers, response.body).into_response()
}

/// Route an intercepted request through the arbiter
pub async fn intercept(
    State(state): State<AppState>,
    req: Request<Body>,
) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut request = FetchRequest::new(
        parts.method,
        state.arbiter.config().resolve(path_and_query)?,
    );
    request.mode = RequestMode::from_headers(&parts.headers);
    request.headers = parts.headers;
    request.body = to_bytes(body, MAX_BODY_BYTES).await?;

    match state.arbiter.handle_fetch(&request).await {
        FetchOutcome::Respond(response) => Ok(into_response(response)),
        FetchOutcome::Bypass => {
            let response = state.arbiter.network().fetch(&request).await?;
            Ok(into_response(response))
        }
        FetchOutcome::Failed => {
            warn!("No response available for {}", request.url);
            Ok((
                StatusCode::GATEWAY_TIMEOUT,
                Json(serde_json::json!({
                    "error": "Network request failed",
                })),
            )
                .into_response())
        }
    }
}

/// Deliver a push message
pub async fn push_event(State(state): State<AppState>, payload: Bytes) -> impl IntoResponse {
    let notification = state.arbiter.handle_push(&payload).await;
    Json(notification)
}

/// Deliver a notification click
pub async fn notification_click(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> StatusCode {
    state.arbiter.handle_notification_click(&notification).await;
    StatusCode::NO_CONTENT
}
