//! Auth cookie codec and the batched cookie mutations of one gate evaluation
//!
//! The auth provider stores the session as JSON in `sb-<ref>-auth-token`,
//! optionally `base64-` prefixed, and splits it over `.0`, `.1`, ... chunks
//! when it is too large for a single cookie.
//!
//! Every cookie write made while resolving a session is recorded in a
//! [`CookieMutations`] batch. The batch is applied once to the inbound request
//! (so downstream handlers see fresh values) and once to the outbound response
//! (so the browser persists them).

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AuthError;
use common::paths::{auth_cookie_base, auth_cookie_names};

/// Largest value written into a single auth cookie
pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";

/// Token material stored in the auth cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// One pending cookie write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieMutation {
    Set { name: String, value: String },
    Remove { name: String },
}

impl CookieMutation {
    fn name(&self) -> &str {
        match self {
            CookieMutation::Set { name, .. } | CookieMutation::Remove { name } => name,
        }
    }
}

/// Ordered batch of cookie writes
#[derive(Debug, Clone, Default)]
pub struct CookieMutations {
    ops: Vec<CookieMutation>,
    secure: bool,
}

impl CookieMutations {
    pub fn new(secure: bool) -> Self {
        Self {
            ops: Vec::new(),
            secure,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.ops.push(CookieMutation::Set {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, name: impl Into<String>) {
        self.ops.push(CookieMutation::Remove { name: name.into() });
    }

    /// Expire every given cookie
    pub fn clear(&mut self, names: &[String]) {
        for name in names {
            self.remove(name.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[CookieMutation] {
        &self.ops
    }

    /// Final mutation per cookie name, in first-seen order
    fn resolved(&self) -> Vec<&CookieMutation> {
        let mut resolved: Vec<&CookieMutation> = Vec::new();
        for op in &self.ops {
            match resolved.iter_mut().find(|seen| seen.name() == op.name()) {
                Some(seen) => *seen = op,
                None => resolved.push(op),
            }
        }
        resolved
    }

    /// Rewrite the `Cookie` header of an inbound request
    pub fn apply_to_request(&self, headers: &mut HeaderMap) {
        if self.ops.is_empty() {
            return;
        }

        let mut pairs: Vec<(String, String)> = CookieJar::from_headers(headers)
            .iter()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();

        for op in &self.ops {
            match op {
                CookieMutation::Set { name, value } => {
                    match pairs.iter_mut().find(|(existing, _)| existing == name) {
                        Some(pair) => pair.1 = value.clone(),
                        None => pairs.push((name.clone(), value.clone())),
                    }
                }
                CookieMutation::Remove { name } => pairs.retain(|(existing, _)| existing != name),
            }
        }

        headers.remove(COOKIE);
        if pairs.is_empty() {
            return;
        }

        let joined = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&joined) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(e) => warn!("Dropping unrepresentable cookie header: {}", e),
        }
    }

    /// Append one `Set-Cookie` header per touched cookie to a response
    pub fn apply_to_response(&self, headers: &mut HeaderMap) {
        for op in self.resolved() {
            let cookie = match op {
                CookieMutation::Set { name, value } => Cookie::build((name.clone(), value.clone()))
                    .path("/")
                    .same_site(SameSite::Lax)
                    .secure(self.secure)
                    .build(),
                CookieMutation::Remove { name } => {
                    let mut cookie = Cookie::build((name.clone(), "")).path("/").build();
                    cookie.make_removal();
                    cookie
                }
            };

            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => warn!("Dropping unrepresentable Set-Cookie for {}: {}", op.name(), e),
            }
        }
    }
}

/// Auth cookies of one project
#[derive(Debug, Clone)]
pub struct AuthCookies {
    base: String,
    names: [String; 3],
}

impl AuthCookies {
    pub fn new(project_ref: &str) -> Self {
        Self {
            base: auth_cookie_base(project_ref),
            names: auth_cookie_names(project_ref),
        }
    }

    /// The three known auth cookie names
    pub fn names(&self) -> &[String; 3] {
        &self.names
    }

    fn chunk_name(&self, index: usize) -> String {
        format!("{}.{}", self.base, index)
    }

    /// Read the raw cookie value, joining chunks when needed
    fn raw_value(&self, jar: &CookieJar) -> Option<String> {
        if let Some(cookie) = jar.get(&self.base) {
            return Some(cookie.value().to_string());
        }

        let mut joined = String::new();
        let mut index = 0;
        while let Some(chunk) = jar.get(&self.chunk_name(index)) {
            joined.push_str(chunk.value());
            index += 1;
        }
        (index > 0).then_some(joined)
    }

    /// Decode the token pair from the request cookies
    ///
    /// Returns `Ok(None)` when no auth cookie is present at all.
    pub fn read(&self, jar: &CookieJar) -> Result<Option<TokenPair>, AuthError> {
        let Some(raw) = self.raw_value(jar) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let json = match raw.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(encoded.trim_end_matches('='))
                    .map_err(|e| AuthError::MalformedCookie(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| AuthError::MalformedCookie(e.to_string()))?
            }
            None => raw,
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| AuthError::MalformedCookie(e.to_string()))
    }

    /// Record the cookie writes persisting a rotated token pair
    pub fn write(&self, pair: &TokenPair, mutations: &mut CookieMutations) -> Result<(), AuthError> {
        let json =
            serde_json::to_string(pair).map_err(|e| AuthError::MalformedCookie(e.to_string()))?;
        let value = format!("{}{}", BASE64_PREFIX, URL_SAFE_NO_PAD.encode(json));

        if value.len() <= MAX_CHUNK_SIZE {
            mutations.set(self.base.clone(), value);
            mutations.remove(self.chunk_name(0));
            mutations.remove(self.chunk_name(1));
            return Ok(());
        }

        // base64 output is ASCII, byte chunks are valid strings
        let chunks: Vec<&str> = value
            .as_bytes()
            .chunks(MAX_CHUNK_SIZE)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        mutations.remove(self.base.clone());
        for (index, chunk) in chunks.iter().enumerate() {
            mutations.set(self.chunk_name(index), *chunk);
        }
        if chunks.len() < 2 {
            mutations.remove(self.chunk_name(1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar_from(cookie: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        CookieJar::from_headers(&headers)
    }

    fn pair(access_len: usize) -> TokenPair {
        TokenPair {
            access_token: "a".repeat(access_len),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(1_900_000_000),
        }
    }

    #[test]
    fn test_read_without_cookie() {
        let cookies = AuthCookies::new("proj");
        assert_eq!(cookies.read(&jar_from("theme=dark")).unwrap(), None);
    }

    #[test]
    fn test_read_plain_json() {
        let cookies = AuthCookies::new("proj");
        let jar = jar_from(r#"sb-proj-auth-token={"access_token":"abc","refresh_token":"def"}"#);

        let pair = cookies.read(&jar).unwrap().unwrap();
        assert_eq!(pair.access_token, "abc");
        assert_eq!(pair.refresh_token.as_deref(), Some("def"));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let cookies = AuthCookies::new("proj");
        let jar = jar_from("sb-proj-auth-token=base64-!!!notbase64");
        assert!(matches!(
            cookies.read(&jar),
            Err(AuthError::MalformedCookie(_))
        ));
    }

    #[test]
    fn test_write_then_read_single_cookie() {
        let cookies = AuthCookies::new("proj");
        let mut mutations = CookieMutations::new(true);
        cookies.write(&pair(40), &mut mutations).unwrap();

        let mut headers = HeaderMap::new();
        mutations.apply_to_request(&mut headers);
        let read = cookies.read(&CookieJar::from_headers(&headers)).unwrap();
        assert_eq!(read, Some(pair(40)));
    }

    #[test]
    fn test_write_chunks_large_sessions() {
        let cookies = AuthCookies::new("proj");
        let mut mutations = CookieMutations::new(true);
        cookies.write(&pair(3000), &mut mutations).unwrap();

        assert!(mutations.ops().contains(&CookieMutation::Remove {
            name: "sb-proj-auth-token".to_string()
        }));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sb-proj-auth-token=stale"));
        mutations.apply_to_request(&mut headers);

        let jar = CookieJar::from_headers(&headers);
        assert!(jar.get("sb-proj-auth-token").is_none());
        assert!(jar.get("sb-proj-auth-token.0").is_some());
        assert!(jar.get("sb-proj-auth-token.1").is_some());
        assert_eq!(cookies.read(&jar).unwrap(), Some(pair(3000)));
    }

    #[test]
    fn test_request_header_rewritten_once() {
        let mut mutations = CookieMutations::new(false);
        mutations.set("a", "1");
        mutations.set("a", "2");
        mutations.remove("b");

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("b=old; theme=dark"));
        mutations.apply_to_request(&mut headers);

        assert_eq!(headers.get_all(COOKIE).iter().count(), 1);
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("a").map(|c| c.value().to_string()), Some("2".to_string()));
        assert!(jar.get("b").is_none());
        assert_eq!(jar.get("theme").map(|c| c.value().to_string()), Some("dark".to_string()));
    }

    #[test]
    fn test_response_gets_one_set_cookie_per_name() {
        let mut mutations = CookieMutations::new(true);
        mutations.set("a", "1");
        mutations.remove("a");
        mutations.set("b", "2");

        let mut headers = HeaderMap::new();
        mutations.apply_to_response(&mut headers);

        let values: Vec<String> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("a=;"));
        assert!(values[0].contains("Max-Age=0"));
        assert!(values[1].starts_with("b=2"));
        assert!(values[1].contains("Secure"));
    }

    #[test]
    fn test_clear_covers_all_known_names() {
        let cookies = AuthCookies::new("proj");
        let mut mutations = CookieMutations::new(true);
        mutations.clear(cookies.names());

        let mut headers = HeaderMap::new();
        mutations.apply_to_response(&mut headers);
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 3);
    }
}
