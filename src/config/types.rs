//! Configuration Types

use crate::config::tls::MutualTlsConfig;
use crate::scheduler::blacklist::BlacklistRange;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub adapter: AdapterConfig,
    pub monitoring: MonitoringConfig,
}

/// Scheduler (control plane) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// URL of the CUPS provider serving the desired binding set
    pub cups_url: String,
    /// Mutual TLS material for the CUPS provider connection
    pub cups_tls: Option<MutualTlsConfig>,
    /// Comma separated list of adapter IP addresses
    pub adapter_ips: String,
    /// Port of the adapter binding API
    pub adapter_port: u16,
    /// Mutual TLS material for adapter API connections
    pub adapter_tls: Option<MutualTlsConfig>,
    /// How often the orchestrator reconciles desired against actual bindings
    #[serde(with = "humantime_serde")]
    pub reconcile_interval: Duration,
    /// Per-request timeout for provider and adapter calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How many adapters each binding should be written to
    pub replication_factor: usize,
    /// Destination IP ranges that drains may never resolve into
    pub blacklist: Vec<BlacklistRange>,
}

/// Adapter (data plane) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// host:port entries of the aggregator egress endpoints
    pub aggregator_addrs: Vec<String>,
    /// Number of concurrently held egress connections
    pub client_pool_size: usize,
    /// How long a single egress connection may live before it is recycled
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    /// Minimum delay between reconnect attempts after a failed dial
    #[serde(with = "humantime_serde")]
    pub retry_wait: Duration,
    /// Bind address of the binding API the scheduler talks to
    pub api_bind_addr: SocketAddr,
    /// Shard identifier sent with every egress subscription
    pub shard_id: String,
    /// Delay before a drain subscription retries after a stream failure
    #[serde(with = "humantime_serde")]
    pub subscription_retry_wait: Duration,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Bind address for the /health and /metrics endpoint, None disables it
    pub ops_bind_addr: Option<SocketAddr>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            adapter: AdapterConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cups_url: String::new(),
            cups_tls: None,
            adapter_ips: String::new(),
            adapter_port: 4443,
            adapter_tls: None,
            reconcile_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            replication_factor: 1,
            blacklist: vec![],
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            aggregator_addrs: vec![],
            client_pool_size: 5,
            rotation_interval: Duration::from_secs(300),
            retry_wait: Duration::from_secs(2),
            api_bind_addr: "127.0.0.1:4443".parse().unwrap(),
            shard_id: "drainscale".to_string(),
            subscription_retry_wait: Duration::from_secs(1),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            ops_bind_addr: Some("127.0.0.1:9090".parse().unwrap()),
            log_level: "info".to_string(),
        }
    }
}
