//! Drain Subscriptions
//!
//! One task per held binding: take an egress client from the manager, open
//! the envelope stream for the binding's app, and forward each envelope to
//! the drain as a syslog line. Any failure, including being handed a stub
//! client before the pool is warm, lands in the retry path.

use crate::adapter::client_manager::ClientManager;
use crate::adapter::egress::{EgressRequest, Envelope, EnvelopeStream};
use crate::bindings::Binding;
use crate::metrics::Metrics;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Tracks the forwarding task of every held binding
pub struct SubscriptionManager {
    clients: Arc<ClientManager>,
    shard_id: String,
    retry_wait: Duration,
    metrics: Arc<Metrics>,
    active: Mutex<HashMap<Binding, JoinHandle<()>>>,
}

impl SubscriptionManager {
    pub fn new(
        clients: Arc<ClientManager>,
        shard_id: String,
        retry_wait: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            clients,
            shard_id,
            retry_wait,
            metrics,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start forwarding for a binding. Starting an already-subscribed
    /// binding is a no-op.
    pub fn start(&self, binding: Binding) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if active.contains_key(&binding) {
            return;
        }

        info!(app_id = %binding.app_id, drain = %binding.drain, "Starting drain subscription");
        let task = Subscription {
            clients: Arc::clone(&self.clients),
            shard_id: self.shard_id.clone(),
            binding: binding.clone(),
            retry_wait: self.retry_wait,
            metrics: Arc::clone(&self.metrics),
        };
        active.insert(binding, tokio::spawn(task.run()));
    }

    /// Stop forwarding for a binding. Unknown bindings are ignored.
    pub fn stop(&self, binding: &Binding) {
        let handle = {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            active.remove(binding)
        };

        if let Some(handle) = handle {
            info!(app_id = %binding.app_id, drain = %binding.drain, "Stopping drain subscription");
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, handle) in active.drain() {
            handle.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

struct Subscription {
    clients: Arc<ClientManager>,
    shard_id: String,
    binding: Binding,
    retry_wait: Duration,
    metrics: Arc<Metrics>,
}

impl Subscription {
    async fn run(self) {
        let request = EgressRequest {
            shard_id: self.shard_id.clone(),
            source_id: self.binding.app_id.clone(),
        };

        loop {
            let client = self.clients.next();
            match client.receiver(request.clone()).await {
                Ok(stream) => {
                    if let Err(e) = self.forward(stream).await {
                        debug!(app_id = %self.binding.app_id, error = %e, "Drain forwarding interrupted");
                    }
                }
                Err(e) => {
                    debug!(app_id = %self.binding.app_id, error = %e, "No egress stream available");
                }
            }

            tokio::time::sleep(self.retry_wait).await;
        }
    }

    async fn forward(&self, mut stream: EnvelopeStream) -> crate::Result<()> {
        let mut drain = DrainWriter::connect(&self.binding.drain).await?;

        while let Some(item) = stream.next().await {
            let envelope = item?;
            drain.write_envelope(&self.binding, &envelope).await?;
            self.metrics.inc_envelopes_forwarded();
        }

        Ok(())
    }
}

/// Writes syslog lines to one drain destination
struct DrainWriter {
    stream: TcpStream,
}

impl DrainWriter {
    async fn connect(drain: &str) -> crate::Result<Self> {
        let url = url::Url::parse(drain).with_context(|| format!("invalid drain URL: {}", drain))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("drain URL has no host: {}", drain))?
            .to_string();
        let port = url.port().unwrap_or(514);

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .with_context(|| format!("failed to connect to drain {}", drain))?;

        Ok(Self { stream })
    }

    async fn write_envelope(&mut self, binding: &Binding, envelope: &Envelope) -> crate::Result<()> {
        let line = format!(
            "<14>1 {} {} {} [{}] - - {}\n",
            format_timestamp(envelope.timestamp),
            binding.hostname,
            binding.app_id,
            envelope.instance_id,
            envelope.payload,
        );
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

fn format_timestamp(nanos: i64) -> String {
    let ts = if nanos > 0 {
        SystemTime::UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        SystemTime::UNIX_EPOCH
    };
    humantime::format_rfc3339_seconds(ts).to_string()
}
