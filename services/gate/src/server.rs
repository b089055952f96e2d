//! Gate service routes
//!
//! Admitted navigations are forwarded to the page renderer with the resolved
//! session attached as `x-user-id` / `x-user-role` headers.

use axum::{
    Extension, Json, Router,
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::error;
use url::Url;

use crate::{error::GateError, gate::Gate, middleware::gate_middleware};
use common::session::Session;

/// Largest request body forwarded to the page renderer
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Identity headers the gate owns on the renderer side
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// HTTP client for the page renderer
///
/// Redirects are never followed: the renderer's 3xx and its cookies belong to
/// the browser.
pub fn renderer_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    pub http: reqwest::Client,
    pub upstream_url: Url,
}

/// Create the router for the gate service
pub fn create_router(state: AppState) -> Router {
    let gated = Router::new()
        .fallback(forward_to_renderer)
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            gate_middleware,
        ))
        .with_state(state);

    Router::new().route("/health", get(health_check)).merge(gated)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gate-service"
    }))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::HOST,
        header::TRANSFER_ENCODING,
        header::CONTENT_LENGTH,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
}

/// Forward an admitted request to the page renderer
pub async fn forward_to_renderer(
    State(state): State<AppState>,
    session: Option<Extension<Session>>,
    req: Request<Body>,
) -> Result<Response, GateError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.upstream_url.join(path_and_query)?;
    let body = to_bytes(body, MAX_BODY_BYTES).await?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    // Only the gate may vouch for an identity
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_ROLE_HEADER);
    if let Some(Extension(session)) = session {
        if let Ok(value) = HeaderValue::from_str(&session.user_id.to_string()) {
            headers.insert(USER_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(session.role.as_str()) {
            headers.insert(USER_ROLE_HEADER, value);
        }
    }

    let upstream = state
        .http
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            error!("Failed to reach page renderer: {}", e);
            GateError::Upstream(e)
        })?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    let body = upstream.bytes().await?;

    Ok((status, headers, body).into_response())
}
