//! The network side of the arbiter

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use tracing::debug;

use crate::{
    error::NetworkError,
    request::{FetchRequest, FetchResponse},
};

/// Performs a request against the origin
///
/// A rejected fetch is the normal trigger for fallback paths, so it is
/// reported as [`NetworkError`] rather than a synthesized response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

/// Drop headers that only describe the hop the bytes arrived on
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
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

/// Network backed by reqwest
///
/// Redirects are handed back as they are: a 3xx, its `Location` and its
/// cookies are for the client to act on, never for the arbiter to follow.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);

        debug!("Fetching {} {}", request.method, request.url);
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = response.bytes().await?;

        Ok(FetchResponse::new(status, headers, body))
    }
}
