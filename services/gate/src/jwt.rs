//! JWT verification for access tokens issued by the auth provider
//!
//! Access tokens are HS256-signed with the project's shared secret and carry
//! the `authenticated` audience. Verification is local; only token rotation
//! needs a round trip to the provider.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AuthError;
use common::session::{Role, Session};

/// Audience carried by tokens of signed-in users
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HS256 secret
    pub secret: String,
    /// Clock skew tolerated on `exp`, in seconds (default: 30)
    pub leeway: u64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            leeway: 30,
        }
    }
}

/// Claims of an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Audience
    pub aud: String,
    /// Expiration time
    pub exp: i64,
    /// Issued at time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// User email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Metadata editable through the auth provider, holds the role claim
    #[serde(default)]
    pub user_metadata: Value,
}

impl Claims {
    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.exp, 0)
    }

    pub fn role(&self) -> Role {
        Role::from_metadata(&self.user_metadata)
    }
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway;
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

        JwtService {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Validate a token and return the claims
    ///
    /// An expired signature is reported as [`AuthError::Expired`] so callers
    /// can attempt a rotation; every other failure is fatal.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e),
            })
    }

    /// Sign claims into a token
    pub fn issue_token(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(AuthError::InvalidToken)
    }

    /// Turn verified claims into a session
    pub fn session_from_claims(
        &self,
        claims: Claims,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Session, AuthError> {
        let expires_at = claims.expires_at().ok_or(AuthError::Expired)?;
        let role = claims.role();

        Ok(Session {
            user_id: claims.sub,
            email: claims.email,
            role,
            expires_at,
            access_token,
            refresh_token,
        })
    }
}
