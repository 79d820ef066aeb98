//! Egress Client Manager
//!
//! Keeps a fixed number of aggregator connections alive and fresh. Each
//! slot is owned by one maintainer task that dials, publishes the client,
//! and recycles the connection once its rotation interval elapses so no
//! single aggregator node is held onto forever. Consumers take clients via
//! [`ClientManager::next`], which never blocks and never returns nothing.

use crate::adapter::connector::Connect;
use crate::adapter::egress::{Closer, EgressStreamer, StubEgressClient};
use crate::metrics::Metrics;
use crate::Result;
use anyhow::bail;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// Recognized options for the client manager
#[derive(Debug, Clone)]
pub struct ClientManagerOptions {
    /// Minimum delay between reconnect attempts on failure
    pub retry_wait: Duration,
}

impl Default for ClientManagerOptions {
    fn default() -> Self {
        Self {
            retry_wait: Duration::from_secs(2),
        }
    }
}

struct Slot {
    closer: Box<dyn Closer>,
    client: Arc<dyn EgressStreamer>,
    created_at: Instant,
}

type SlotCell = RwLock<Option<Slot>>;

/// Self-healing pool of egress clients with proactive rotation
pub struct ClientManager {
    slots: Arc<Vec<SlotCell>>,
    next_idx: AtomicUsize,
    shutdown: broadcast::Sender<()>,
}

impl ClientManager {
    /// Spawn one maintainer per slot. Slots fill as soon as their first
    /// dial succeeds; until then next() hands out stub clients.
    pub fn new<C: Connect>(
        connector: C,
        pool_size: usize,
        rotation_interval: Duration,
        opts: ClientManagerOptions,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        if pool_size == 0 {
            bail!("client pool size must be at least 1");
        }

        let connector = Arc::new(connector);
        let slots: Arc<Vec<SlotCell>> =
            Arc::new((0..pool_size).map(|_| RwLock::new(None)).collect());
        let (shutdown, _) = broadcast::channel(1);

        for slot_idx in 0..pool_size {
            let maintainer = SlotMaintainer {
                connector: Arc::clone(&connector),
                slots: Arc::clone(&slots),
                slot_idx,
                rotation_interval,
                retry_wait: opts.retry_wait,
                shutdown: shutdown.subscribe(),
                metrics: Arc::clone(&metrics),
            };
            tokio::spawn(maintainer.run());
        }

        Ok(Self {
            slots,
            next_idx: AtomicUsize::new(0),
            shutdown,
        })
    }

    /// Return a published client, round-robin across slots. When no slot is
    /// live yet this returns a stub client whose calls fail cleanly, so the
    /// caller always holds a usable-as-a-value handle.
    pub fn next(&self) -> Arc<dyn EgressStreamer> {
        let len = self.slots.len();
        let start = self.next_idx.fetch_add(1, Ordering::Relaxed);

        for offset in 0..len {
            let idx = (start + offset) % len;
            let guard = self.slots[idx]
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(slot) = guard.as_ref() {
                return Arc::clone(&slot.client);
            }
        }

        Arc::new(StubEgressClient)
    }

    /// Close every slot and stop the maintainers. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Drop for ClientManager {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SlotMaintainer<C> {
    connector: Arc<C>,
    slots: Arc<Vec<SlotCell>>,
    slot_idx: usize,
    rotation_interval: Duration,
    retry_wait: Duration,
    shutdown: broadcast::Receiver<()>,
    metrics: Arc<Metrics>,
}

impl<C: Connect> SlotMaintainer<C> {
    async fn run(mut self) {
        'maintain: loop {
            // unbounded retries: a bounded policy would eventually leave the
            // pool short of its configured size
            let (closer, client) = loop {
                match self.connector.connect().await {
                    Ok(pair) => break pair,
                    Err(e) => {
                        debug!(slot = self.slot_idx, error = %e, "Failed to connect to aggregator, retrying");
                        tokio::select! {
                            _ = tokio::time::sleep(self.retry_wait) => {}
                            _ = self.shutdown.recv() => break 'maintain,
                        }
                    }
                }
            };

            self.publish(closer, client);

            tokio::select! {
                _ = tokio::time::sleep(self.rotation_interval) => self.recycle(),
                _ = self.shutdown.recv() => break 'maintain,
            }
        }

        self.close_slot();
    }

    /// Atomically replace the slot's occupant. Readers concurrently calling
    /// next() observe either the previous client or the new one.
    fn publish(&self, closer: Box<dyn Closer>, client: Arc<dyn EgressStreamer>) {
        let previous = {
            let mut guard = self.slots[self.slot_idx]
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.replace(Slot {
                closer,
                client,
                created_at: Instant::now(),
            })
        };

        if let Some(previous) = previous {
            previous.closer.close();
            self.metrics.inc_egress_closes();
        }
    }

    /// Empty the slot and close its connection ahead of a reconnect.
    fn recycle(&self) {
        let slot = {
            let mut guard = self.slots[self.slot_idx]
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };

        if let Some(slot) = slot {
            debug!(
                slot = self.slot_idx,
                age = ?slot.created_at.elapsed(),
                "Rotating egress connection"
            );
            slot.closer.close();
            self.metrics.inc_egress_closes();
        }
    }

    fn close_slot(&self) {
        let slot = {
            let mut guard = self.slots[self.slot_idx]
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };

        if let Some(slot) = slot {
            slot.closer.close();
            self.metrics.inc_egress_closes();
        }
    }
}
