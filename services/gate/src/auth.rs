//! Session resolution against the auth provider

use async_trait::async_trait;
use chrono::Utc;
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::{
    cookies::{AuthCookies, CookieMutations, TokenPair},
    error::AuthError,
    jwt::JwtService,
};
use common::session::Session;

/// Token issuance side of the auth provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange a refresh token for a fresh token pair
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
}

/// HTTP client for the auth provider's token endpoint
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    token_url: Url,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &Url, anon_key: impl Into<String>) -> Result<Self, url::ParseError> {
        let mut token_url = base_url.join("/auth/v1/token")?;
        token_url.set_query(Some("grant_type=refresh_token"));

        Ok(Self {
            http: reqwest::Client::new(),
            token_url,
            anon_key: anon_key.into(),
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Refresh(format!("auth provider answered {}", status)));
        }

        Ok(response.json::<TokenPair>().await?)
    }
}

/// Resolves the caller's session from the auth cookies
///
/// Verification is local; an expired access token is rotated through the
/// provider and the new cookies are recorded on the mutation batch. A token
/// still accepted under the clock-skew leeway is rotated as well when a
/// refresh token is at hand.
#[derive(Clone)]
pub struct SessionResolver {
    jwt: JwtService,
    provider: Arc<dyn AuthProvider>,
    cookies: AuthCookies,
}

impl SessionResolver {
    pub fn new(jwt: JwtService, provider: Arc<dyn AuthProvider>, cookies: AuthCookies) -> Self {
        Self {
            jwt,
            provider,
            cookies,
        }
    }

    pub fn cookies(&self) -> &AuthCookies {
        &self.cookies
    }

    /// Resolve the session carried by `jar`
    ///
    /// `Ok(None)` means no auth cookie was sent. Any error means a cookie was
    /// sent but could not be turned into a valid session.
    pub async fn resolve(
        &self,
        jar: &CookieJar,
        mutations: &mut CookieMutations,
    ) -> Result<Option<Session>, AuthError> {
        let Some(pair) = self.cookies.read(jar)? else {
            return Ok(None);
        };

        match self.jwt.validate_token(&pair.access_token) {
            Ok(claims) => {
                let session =
                    self.jwt
                        .session_from_claims(claims, pair.access_token, pair.refresh_token)?;
                // Past `exp` but inside the clock-skew leeway: rotate early when possible
                if session.is_expired(Utc::now()) {
                    if let Some(refresh_token) = session.refresh_token.clone() {
                        return self.rotate(&refresh_token, mutations).await.map(Some);
                    }
                }
                Ok(Some(session))
            }
            Err(AuthError::Expired) => {
                let refresh_token = pair.refresh_token.ok_or(AuthError::Expired)?;
                self.rotate(&refresh_token, mutations).await.map(Some)
            }
            Err(e) => Err(e),
        }
    }

    async fn rotate(
        &self,
        refresh_token: &str,
        mutations: &mut CookieMutations,
    ) -> Result<Session, AuthError> {
        let rotated = self.provider.refresh(refresh_token).await.map_err(|e| {
            warn!("Failed to rotate session tokens: {}", e);
            e
        })?;

        let claims = self.jwt.validate_token(&rotated.access_token)?;
        self.cookies.write(&rotated, mutations)?;
        info!("Rotated session tokens for user: {}", claims.sub);

        self.jwt.session_from_claims(
            claims,
            rotated.access_token.clone(),
            rotated.refresh_token.clone(),
        )
    }
}
