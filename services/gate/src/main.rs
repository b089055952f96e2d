use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use gate::{
    auth::{SessionResolver, SupabaseAuthClient},
    config::GateConfig,
    cookies::AuthCookies,
    gate::Gate,
    jwt::{JwtConfig, JwtService},
    server::{AppState, create_router, renderer_client},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .init();

    info!("Starting request gate");

    let config = GateConfig::from_env()?;

    let jwt_service = JwtService::new(&JwtConfig::new(config.jwt_secret.clone()));
    let auth_client = SupabaseAuthClient::new(&config.auth_url, config.anon_key.clone())?;
    let resolver = SessionResolver::new(
        jwt_service,
        Arc::new(auth_client),
        AuthCookies::new(&config.project_ref),
    );
    let gate = Gate::new(resolver, config.secure_cookies);

    let app_state = AppState {
        gate: Arc::new(gate),
        http: renderer_client()?,
        upstream_url: config.upstream_url.clone(),
    };

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(
        "Request gate listening on {}, forwarding to {}",
        config.bind_addr, config.upstream_url
    );

    axum::serve(listener, app).await?;

    Ok(())
}
