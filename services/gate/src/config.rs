//! Gate configuration

use anyhow::Result;
use url::Url;

/// Request gate configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Base URL of the auth provider
    pub auth_url: Url,
    /// Public API key sent to the auth provider
    pub anon_key: String,
    /// Shared secret used to verify access tokens locally
    pub jwt_secret: String,
    /// Project reference embedded in the auth cookie names
    pub project_ref: String,
    /// Page renderer the gate forwards admitted requests to
    pub upstream_url: Url,
    /// Address the gate listens on
    pub bind_addr: String,
    /// Whether written cookies carry the `Secure` attribute
    pub secure_cookies: bool,
}

impl GateConfig {
    /// Create a new GateConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SUPABASE_URL`: Auth provider base URL (required)
    /// - `SUPABASE_ANON_KEY`: Auth provider public key (required)
    /// - `SUPABASE_JWT_SECRET`: HS256 secret for access tokens (required)
    /// - `SUPABASE_PROJECT_REF`: Cookie project reference (default: first host label of `SUPABASE_URL`)
    /// - `GATE_UPSTREAM_URL`: Page renderer URL (default: "http://localhost:3000")
    /// - `GATE_BIND_ADDR`: Listen address (default: "0.0.0.0:8080")
    /// - `GATE_SECURE_COOKIES`: Mark cookies `Secure` (default: true)
    pub fn from_env() -> Result<Self> {
        let auth_url = std::env::var("SUPABASE_URL")
            .map_err(|_| anyhow::anyhow!("SUPABASE_URL environment variable not set"))?;
        let auth_url = Url::parse(&auth_url)
            .map_err(|e| anyhow::anyhow!("Invalid SUPABASE_URL: {}", e))?;

        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| anyhow::anyhow!("SUPABASE_ANON_KEY environment variable not set"))?;

        let jwt_secret = std::env::var("SUPABASE_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("SUPABASE_JWT_SECRET environment variable not set"))?;

        let project_ref = match std::env::var("SUPABASE_PROJECT_REF") {
            Ok(project_ref) => project_ref,
            Err(_) => project_ref_from_url(&auth_url)
                .ok_or_else(|| anyhow::anyhow!("Cannot derive project ref from SUPABASE_URL"))?,
        };

        let upstream_url = std::env::var("GATE_UPSTREAM_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let upstream_url = Url::parse(&upstream_url)
            .map_err(|e| anyhow::anyhow!("Invalid GATE_UPSTREAM_URL: {}", e))?;

        let bind_addr =
            std::env::var("GATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let secure_cookies = std::env::var("GATE_SECURE_COOKIES")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(GateConfig {
            auth_url,
            anon_key,
            jwt_secret,
            project_ref,
            upstream_url,
            bind_addr,
            secure_cookies,
        })
    }
}

/// First label of the auth provider host, e.g. `abcd` for `https://abcd.supabase.co`
fn project_ref_from_url(url: &Url) -> Option<String> {
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}
