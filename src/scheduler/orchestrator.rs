//! Reconciliation Orchestrator
//!
//! Periodically converges the bindings held across the adapter fleet onto
//! the desired set reported by the CUPS provider: extraneous bindings are
//! deleted first, then every desired binding is (re-)written. The pool layer
//! keeps the unconditional writes off the wire when nothing changed.

use crate::bindings::{AppBindings, Binding, Bindings};
use crate::metrics::Metrics;
use crate::scheduler::pool::PoolError;
use crate::scheduler::reader::FetchError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Source of the desired binding set
#[async_trait]
pub trait BindingReader: Send + Sync + 'static {
    async fn fetch_bindings(&self) -> Result<AppBindings, FetchError>;
}

/// Writes bindings to a number of adapters
#[async_trait]
pub trait AdapterPool: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Vec<Binding>>, PoolError>;
    async fn create(&self, binding: &Binding) -> Result<(), PoolError>;
    async fn delete(&self, binding: &Binding) -> Result<(), PoolError>;
}

/// Reconciliation control loop over one reader and one adapter pool
pub struct Orchestrator<R, P> {
    reader: R,
    pool: P,
    metrics: Arc<Metrics>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    stop_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl<R, P> Orchestrator<R, P>
where
    R: BindingReader,
    P: AdapterPool,
{
    pub fn new(reader: R, pool: P, metrics: Arc<Metrics>) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        Self {
            reader,
            pool,
            metrics,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    /// Run the reconciliation loop until stop() is called. The first pass
    /// happens one full interval after startup.
    pub async fn run(&self, interval: Duration) {
        let mut stop_rx = match self.stop_rx.lock() {
            Ok(mut slot) => match slot.take() {
                Some(rx) => rx,
                None => {
                    warn!("Orchestrator started twice, ignoring");
                    return;
                }
            },
            Err(_) => return,
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of an interval fires immediately
        ticker.tick().await;

        info!(interval = ?interval, "Orchestrator started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile().await;
                }
                _ = &mut stop_rx => {
                    info!("Orchestrator stopped");
                    return;
                }
            }
        }
    }

    /// Signal the loop to exit at the next tick boundary. Safe to call more
    /// than once.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.stop_tx.lock() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(());
            }
        }
    }

    /// One full reconciliation pass: fetch desired state, delete extraneous
    /// bindings, then write the desired set. All deletes complete before the
    /// first create so a moving binding never over-replicates mid-pass.
    pub async fn reconcile(&self) {
        self.metrics.inc_reconcile_ticks();

        let expected = match self.reader.fetch_bindings().await {
            Ok(expected) => expected,
            Err(e) => {
                self.metrics.inc_fetch_failures();
                warn!(error = %e, "Failed to fetch desired bindings, skipping tick");
                return;
            }
        };

        self.cleanup_bindings(&expected).await;
        self.create_bindings(&expected).await;
    }

    async fn cleanup_bindings(&self, expected: &AppBindings) {
        let actual = match self.pool.list().await {
            Ok(actual) => actual,
            Err(e) => {
                warn!(error = %e, "Failed to list actual bindings, skipping cleanup");
                return;
            }
        };

        let actual: Bindings = actual.into_iter().flatten().collect::<Vec<_>>().into();
        let to_delete: Vec<&Binding> = actual
            .iter()
            .filter(|binding| !exists(expected, binding))
            .collect();

        if !to_delete.is_empty() {
            debug!(count = to_delete.len(), "Deleting extraneous bindings");
        }

        for binding in to_delete {
            if let Err(e) = self.pool.delete(binding).await {
                warn!(app_id = %binding.app_id, drain = %binding.drain, error = %e, "Failed to delete binding");
            }
        }
    }

    async fn create_bindings(&self, expected: &AppBindings) {
        for (app_id, app) in expected {
            for drain in &app.drains {
                let binding = Binding {
                    hostname: app.hostname.clone(),
                    app_id: app_id.clone(),
                    drain: drain.clone(),
                };

                if let Err(e) = self.pool.create(&binding).await {
                    warn!(app_id = %binding.app_id, drain = %binding.drain, error = %e, "Failed to write binding");
                }
            }
        }
    }
}

fn exists(expected: &AppBindings, binding: &Binding) -> bool {
    match expected.get(&binding.app_id) {
        Some(app) => app.drains.iter().any(|drain| drain == &binding.drain),
        None => false,
    }
}
