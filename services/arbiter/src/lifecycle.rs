//! Install and activate
//!
//! Both steps only return once all their storage work has settled, so the
//! host can hold the lifecycle event open by awaiting them.

use axum::http::{Method, StatusCode};
use futures_util::future::{join_all, try_join_all};
use tracing::{info, warn};

use crate::{
    arbiter::Arbiter,
    error::{ArbiterError, ArbiterResult},
    request::{FetchRequest, FetchResponse},
};

impl Arbiter {
    /// Populate the static generation with the shell assets, then take over
    ///
    /// Assets are all fetched before any is stored: one failing asset leaves
    /// the generation untouched.
    pub async fn install(&self) -> ArbiterResult<()> {
        let static_generation = &self.config.static_generation;
        info!(
            "Installing {} shell assets into {}",
            self.config.shell_assets.len(),
            static_generation
        );

        let fetches = self
            .config
            .shell_assets
            .iter()
            .map(|asset| self.fetch_shell_asset(asset));
        let fetched = try_join_all(fetches).await?;

        self.storage.open(static_generation).await?;
        for (key, response) in fetched {
            self.storage
                .put(static_generation, &key, response.to_stored())
                .await?;
        }

        self.host.skip_waiting().await;
        Ok(())
    }

    /// Delete every generation that is not current, then claim all clients
    ///
    /// Returns the names of the deleted generations.
    pub async fn activate(&self) -> ArbiterResult<Vec<String>> {
        let current = self.config.current_generations();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !current.contains(&name.as_str()))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            let result = self.storage.delete(name).await;
            (name, result)
        });

        let mut deleted = Vec::with_capacity(stale.len());
        let mut failure = None;
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => {
                    info!("Deleted stale cache generation {}", name);
                    deleted.push(name.clone());
                }
                Err(e) => {
                    warn!("Failed to delete cache generation {}: {}", name, e);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        self.host.claim_clients().await;
        Ok(deleted)
    }

    async fn fetch_shell_asset(&self, asset: &str) -> ArbiterResult<(String, FetchResponse)> {
        let request = FetchRequest::new(Method::GET, self.config.resolve(asset)?);
        let response =
            self.network
                .fetch(&request)
                .await
                .map_err(|source| ArbiterError::InstallFetch {
                    asset: asset.to_string(),
                    source,
                })?;

        if response.status != StatusCode::OK {
            return Err(ArbiterError::InstallStatus {
                asset: asset.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok((request.cache_key(), response))
    }
}
