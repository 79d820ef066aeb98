//! Desired Binding Reader
//!
//! Fetches the desired binding set from the CUPS provider and filters every
//! drain through the destination blacklist. A drain that cannot be parsed,
//! resolved, or points at a blacklisted address is dropped on its own; only
//! a failed provider call fails the whole fetch.

use crate::bindings::{AppBinding, AppBindings};
use crate::metrics::Metrics;
use crate::scheduler::blacklist::{BlacklistError, BlacklistRanges};
use crate::scheduler::orchestrator::BindingReader;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Raised when the desired binding set cannot be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch bindings: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bindings provider returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Reads desired bindings from the CUPS provider over mutual TLS
pub struct CupsReader {
    client: reqwest::Client,
    url: String,
    blacklist: BlacklistRanges,
    metrics: Arc<Metrics>,
}

impl CupsReader {
    pub fn new(
        client: reqwest::Client,
        url: String,
        blacklist: BlacklistRanges,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            url,
            blacklist,
            metrics,
        }
    }

    /// Keep only drains whose destination passes the blacklist filter.
    /// Resolutions run concurrently; relative drain order is preserved.
    async fn filter_drains(&self, app_id: &str, drains: Vec<String>) -> Vec<String> {
        let checks = drains.into_iter().map(|drain| async move {
            match self.check_drain(&drain).await {
                Ok(()) => Some(drain),
                Err(e) => {
                    self.metrics.inc_drains_dropped();
                    warn!(app_id = %app_id, drain = %drain, error = %e, "Dropping drain");
                    None
                }
            }
        });

        futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn check_drain(&self, drain: &str) -> Result<(), BlacklistError> {
        let host = self.blacklist.parse_host(drain)?;
        let ip = self.blacklist.resolve_addr(&host).await?;
        self.blacklist.check(ip)
    }
}

#[async_trait]
impl BindingReader for CupsReader {
    async fn fetch_bindings(&self) -> Result<AppBindings, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let desired: AppBindings = response.json().await?;

        let mut filtered = AppBindings::new();
        for (app_id, app) in desired {
            let drains = self.filter_drains(&app_id, app.drains).await;
            if drains.is_empty() {
                // an app with no usable drains is not a binding at all
                continue;
            }
            filtered.insert(
                app_id,
                AppBinding {
                    hostname: app.hostname,
                    drains,
                },
            );
        }

        debug!(apps = filtered.len(), "Fetched desired bindings");
        Ok(filtered)
    }
}
