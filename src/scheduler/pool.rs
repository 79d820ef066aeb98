//! Adapter Pool
//!
//! Fans binding RPCs out over the static adapter set. List queries every
//! adapter in parallel and tolerates stragglers; Create places a binding on
//! enough adapters to meet the replication factor; Delete removes it from
//! every adapter reporting it. Create and Delete are idempotent here so the
//! orchestrator may re-issue them every tick without churning the wire.

use crate::bindings::{Binding, BindingList};
use crate::metrics::Metrics;
use crate::scheduler::orchestrator::AdapterPool;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Raised when a pool operation fails on every relevant adapter
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("all adapters failed to list bindings")]
    ListFailed,
    #[error("failed to write binding to any adapter")]
    CreateFailed,
    #[error("failed to delete binding from any adapter holding it")]
    DeleteFailed,
}

/// Pool of adapter binding APIs reached over HTTPS
pub struct HttpAdapterPool {
    client: reqwest::Client,
    adapters: Vec<String>,
    replication_factor: usize,
    scheme: &'static str,
    /// Last observed binding set per adapter, aligned with `adapters`.
    /// Refreshed by list() and adjusted by accepted creates and deletes.
    known: RwLock<Vec<HashSet<Binding>>>,
    metrics: Arc<Metrics>,
}

impl HttpAdapterPool {
    /// `adapters` holds host:port entries; membership is fixed at startup.
    pub fn new(
        client: reqwest::Client,
        adapters: Vec<String>,
        replication_factor: usize,
        use_tls: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        let known = RwLock::new(vec![HashSet::new(); adapters.len()]);
        Self {
            client,
            adapters,
            replication_factor,
            scheme: if use_tls { "https" } else { "http" },
            known,
            metrics,
        }
    }

    fn bindings_url(&self, adapter: &str) -> String {
        format!("{}://{}/bindings", self.scheme, adapter)
    }

    async fn list_one(&self, adapter: &str) -> crate::Result<Vec<Binding>> {
        let response = self
            .client
            .get(self.bindings_url(adapter))
            .send()
            .await?
            .error_for_status()?;

        let list: BindingList = response.json().await?;
        Ok(list.bindings)
    }

    async fn create_one(&self, adapter: &str, binding: &Binding) -> crate::Result<()> {
        self.client
            .post(self.bindings_url(adapter))
            .json(binding)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_one(&self, adapter: &str, binding: &Binding) -> crate::Result<()> {
        self.client
            .delete(self.bindings_url(adapter))
            .json(binding)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl AdapterPool for HttpAdapterPool {
    /// Query every adapter in parallel. A failing adapter contributes an
    /// empty slot; only total failure is an error.
    async fn list(&self) -> Result<Vec<Vec<Binding>>, PoolError> {
        let queries = self.adapters.iter().map(|adapter| self.list_one(adapter));
        let results = join_all(queries).await;

        let mut per_adapter = Vec::with_capacity(self.adapters.len());
        let mut failures = 0;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(bindings) => per_adapter.push(bindings),
                Err(e) => {
                    failures += 1;
                    warn!(adapter = %self.adapters[i], error = %e, "Failed to list bindings");
                    per_adapter.push(Vec::new());
                }
            }
        }

        if !self.adapters.is_empty() && failures == self.adapters.len() {
            return Err(PoolError::ListFailed);
        }

        let mut known = self.known.write().await;
        *known = per_adapter
            .iter()
            .map(|bindings| bindings.iter().cloned().collect())
            .collect();

        Ok(per_adapter)
    }

    /// Place the binding on enough adapters to meet the replication factor.
    /// Adapters already reporting it count toward the factor, so a duplicate
    /// create issues no RPC at all. Targets are the least loaded adapters,
    /// ties broken by adapter index.
    async fn create(&self, binding: &Binding) -> Result<(), PoolError> {
        let wanted = self.replication_factor.min(self.adapters.len());

        let (held, mut candidates) = {
            let known = self.known.read().await;
            let held = known.iter().filter(|set| set.contains(binding)).count();
            let candidates: Vec<(usize, usize)> = known
                .iter()
                .enumerate()
                .filter(|(_, set)| !set.contains(binding))
                .map(|(i, set)| (set.len(), i))
                .collect();
            (held, candidates)
        };

        if held >= wanted {
            return Ok(());
        }
        candidates.sort_unstable();

        let mut placed = 0;
        for (_, i) in candidates {
            if held + placed >= wanted {
                break;
            }
            match self.create_one(&self.adapters[i], binding).await {
                Ok(()) => {
                    self.known.write().await[i].insert(binding.clone());
                    self.metrics.inc_bindings_created();
                    placed += 1;
                    debug!(adapter = %self.adapters[i], app_id = %binding.app_id, "Created binding");
                }
                Err(e) => {
                    warn!(adapter = %self.adapters[i], app_id = %binding.app_id, error = %e, "Failed to create binding");
                }
            }
        }

        if held + placed == 0 {
            return Err(PoolError::CreateFailed);
        }
        Ok(())
    }

    /// Remove the binding from every adapter reporting it. Deleting a
    /// binding no adapter holds is a successful no-op.
    async fn delete(&self, binding: &Binding) -> Result<(), PoolError> {
        let targets: Vec<usize> = {
            let known = self.known.read().await;
            known
                .iter()
                .enumerate()
                .filter(|(_, set)| set.contains(binding))
                .map(|(i, _)| i)
                .collect()
        };

        if targets.is_empty() {
            return Ok(());
        }

        let mut failures = 0;
        for i in targets.iter().copied() {
            match self.delete_one(&self.adapters[i], binding).await {
                Ok(()) => {
                    self.known.write().await[i].remove(binding);
                    self.metrics.inc_bindings_deleted();
                    debug!(adapter = %self.adapters[i], app_id = %binding.app_id, "Deleted binding");
                }
                Err(e) => {
                    failures += 1;
                    warn!(adapter = %self.adapters[i], app_id = %binding.app_id, error = %e, "Failed to delete binding");
                }
            }
        }

        if failures == targets.len() {
            return Err(PoolError::DeleteFailed);
        }
        Ok(())
    }
}
