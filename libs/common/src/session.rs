//! Session model and role claim
//!
//! The role is read from the `role` key of the signed token's user metadata.
//! That claim is the single source of truth for authorization tiers: every
//! layer that needs a role goes through [`Role::from_metadata`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Authorization tier carried by a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Role {
    Admin,
    #[default]
    Employee,
    Other(String),
}

impl Role {
    /// Parse a role claim, defaulting to `employee` when absent or blank
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim.map(str::trim) {
            None | Some("") => Role::Employee,
            Some(value) if value.eq_ignore_ascii_case("admin") => Role::Admin,
            Some(value) if value.eq_ignore_ascii_case("employee") => Role::Employee,
            Some(value) => Role::Other(value.to_lowercase()),
        }
    }

    /// Read the role claim out of a metadata object
    pub fn from_metadata(metadata: &Value) -> Self {
        Self::from_claim(metadata.get("role").and_then(Value::as_str))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Other(value) => value,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified session of one browser or device
#[derive(Clone)]
pub struct Session {
    /// Subject identifier
    pub user_id: Uuid,
    /// Email claim, when the provider includes one
    pub email: Option<String>,
    /// Role claim
    pub role: Role,
    /// Expiry of the access token
    pub expires_at: DateTime<Utc>,
    /// Raw access token
    pub access_token: String,
    /// Raw refresh token
    pub refresh_token: Option<String>,
}

impl Session {
    /// Check whether the session has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Token material stays out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
