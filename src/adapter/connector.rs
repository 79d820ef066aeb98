//! Egress Connector
//!
//! Stateless factory for aggregator egress connections: each call picks the
//! next aggregator host from the balancer and dials a fresh connection.

use crate::adapter::balancer::{Balancer, NoHostError};
use crate::adapter::egress::{Closer, EgressConn, EgressStreamer};
use crate::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    NoHost(#[from] NoHostError),
    #[error("failed to dial aggregator at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Transport options applied to every dial
#[derive(Debug, Clone)]
pub struct DialOpts {
    pub connect_timeout: Duration,
}

impl Default for DialOpts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Anything that can produce one egress connection per call
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    async fn connect(&self) -> Result<(Box<dyn Closer>, Arc<dyn EgressStreamer>), ConnectError>;
}

/// Connects to the aggregator egress API
pub struct Connector {
    balancer: Balancer,
    opts: DialOpts,
    metrics: Arc<Metrics>,
}

impl Connector {
    pub fn new(balancer: Balancer, opts: DialOpts, metrics: Arc<Metrics>) -> Self {
        Self {
            balancer,
            opts,
            metrics,
        }
    }
}

#[async_trait]
impl Connect for Connector {
    async fn connect(&self) -> Result<(Box<dyn Closer>, Arc<dyn EgressStreamer>), ConnectError> {
        let addr = self.balancer.next_host_port()?;

        let socket = tokio::time::timeout(self.opts.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectError::Dial {
                addr: addr.clone(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|e| ConnectError::Dial {
                addr: addr.clone(),
                source: e,
            })?;

        let (closer, client) = EgressConn::pair(addr, socket);
        self.metrics.inc_egress_connects();
        info!(addr = %client.addr(), id = %client.id(), "Created new connection to aggregator egress API");

        Ok((Box::new(closer), Arc::new(client)))
    }
}
