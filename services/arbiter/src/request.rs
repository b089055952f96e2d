//! Intercepted requests and the responses handed back for them

use axum::{
    body::Bytes,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{ACCEPT, CONTENT_TYPE, SET_COOKIE},
    },
};
use serde_json::json;
use url::Url;

use crate::error::{ArbiterError, ArbiterResult};
use common::cache::{StoredResponse, request_key};

/// How the client issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation
    Navigate,
    #[default]
    Other,
}

impl RequestMode {
    /// Read the mode from `Sec-Fetch-Mode` / `Sec-Fetch-Dest`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_is = |name: &str, expected: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case(expected))
        };

        if header_is("sec-fetch-mode", "navigate") || header_is("sec-fetch-dest", "document") {
            RequestMode::Navigate
        } else {
            RequestMode::Other
        }
    }
}

/// Request seen by the arbiter
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::Other,
            body: Bytes::new(),
        }
    }

    /// Plain GET request
    pub fn get(url: &str) -> ArbiterResult<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Document navigation accepting HTML
    pub fn navigate(url: &str) -> ArbiterResult<Self> {
        let mut request = Self::get(url)?;
        request.mode = RequestMode::Navigate;
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        Ok(request)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }

    /// Key of this request inside a cache generation
    pub fn cache_key(&self) -> String {
        request_key(self.url.as_str())
    }
}

fn is_cookie_setter(name: &HeaderName) -> bool {
    *name == SET_COOKIE || name.as_str() == "set-cookie2"
}

/// Response handed back for an intercepted request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Synthesized answer for never-cache requests when the network is down
    pub fn offline_json() -> Self {
        let body = json!({
            "error": "Network request failed",
            "offline": true,
        });
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(StatusCode::SERVICE_UNAVAILABLE, headers, body.to_string())
    }

    /// Last-resort document when neither network nor cache can answer
    pub fn offline_page() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            "<!doctype html><title>Offline</title><h1>You are offline</h1>",
        )
    }

    /// Snapshot for a cache generation
    ///
    /// Cookies set by the origin are not part of the snapshot; a replay must
    /// never resurrect a cookie the browser has since replaced or cleared.
    pub fn to_stored(&self) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| !is_cookie_setter(name))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        StoredResponse::new(self.status.as_u16(), headers, self.body.to_vec())
    }

    pub fn from_stored(stored: StoredResponse) -> ArbiterResult<Self> {
        let status = StatusCode::from_u16(stored.status)
            .map_err(|e| ArbiterError::StoredResponse(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in stored.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ArbiterError::StoredResponse(e.to_string()))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ArbiterError::StoredResponse(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Self::new(status, headers, stored.body))
    }
}
