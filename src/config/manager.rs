//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let mut config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            Self::apply_env_overrides(&mut config)?;
            config.validate()?;

            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let mut config = Config::default();
            Self::apply_env_overrides(&mut config)?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Override configuration fields from environment variables
    fn apply_env_overrides(config: &mut Config) -> Result<()> {
        if let Ok(url) = std::env::var("DRAINSCALE_CUPS_URL") {
            config.scheduler.cups_url = url;
        }

        if let Ok(ips) = std::env::var("DRAINSCALE_ADAPTER_IPS") {
            config.scheduler.adapter_ips = ips;
        }

        if let Ok(port) = std::env::var("DRAINSCALE_ADAPTER_PORT") {
            config.scheduler.adapter_port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid DRAINSCALE_ADAPTER_PORT: {}", port))?;
        }

        if let Ok(interval) = std::env::var("DRAINSCALE_RECONCILE_INTERVAL") {
            config.scheduler.reconcile_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid DRAINSCALE_RECONCILE_INTERVAL: {}", interval))?;
        }

        if let Ok(addrs) = std::env::var("DRAINSCALE_AGGREGATOR_ADDRS") {
            config.adapter.aggregator_addrs =
                addrs.split(',').map(|a| a.trim().to_string()).collect();
        }

        if let Ok(level) = std::env::var("DRAINSCALE_LOG_LEVEL") {
            config.monitoring.log_level = level;
        }

        Ok(())
    }
}

/// Build the static adapter endpoint list from a comma separated IP list and
/// a shared port. Empty entries are rejected.
pub fn parse_adapter_addrs(ips: &str, port: u16) -> Result<Vec<String>> {
    if port == 0 {
        bail!("adapter port must be greater than 0");
    }

    let mut addrs = Vec::new();
    for entry in ips.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            bail!("adapter IP list contains an empty entry: {:?}", ips);
        }
        addrs.push(format!("{}:{}", entry, port));
    }

    Ok(addrs)
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_scheduler_config()
            .context("Scheduler configuration validation failed")?;

        self.validate_adapter_config()
            .context("Adapter configuration validation failed")?;

        self.validate_monitoring_config()
            .context("Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_scheduler_config(&self) -> Result<()> {
        if self.scheduler.replication_factor == 0 {
            bail!("replication_factor must be greater than 0");
        }

        if self.scheduler.reconcile_interval.is_zero() {
            bail!("reconcile_interval must be greater than 0");
        }

        if self.scheduler.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_adapter_config(&self) -> Result<()> {
        if self.adapter.client_pool_size == 0 {
            bail!("client_pool_size must be greater than 0");
        }

        if self.adapter.rotation_interval.is_zero() {
            bail!("rotation_interval must be greater than 0");
        }

        if self.adapter.retry_wait.is_zero() {
            bail!("retry_wait must be greater than 0");
        }

        for (i, addr) in self.adapter.aggregator_addrs.iter().enumerate() {
            if addr.is_empty() {
                bail!("aggregator_addrs entry {} is empty", i);
            }
        }

        if self.adapter.shard_id.is_empty() {
            bail!("shard_id must not be empty");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!(
                "monitoring.log_level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Merge scheduler related CLI arguments
    pub fn merge_scheduler_cli_args(
        &mut self,
        cups_url: Option<&str>,
        adapter_ips: Option<&str>,
        adapter_port: Option<u16>,
        interval: Option<&str>,
    ) -> Result<()> {
        if let Some(url) = cups_url {
            self.scheduler.cups_url = url.to_string();
            tracing::info!("CLI override: cups-url set to {}", url);
        }

        if let Some(ips) = adapter_ips {
            self.scheduler.adapter_ips = ips.to_string();
            tracing::info!("CLI override: adapter-ips set to {}", ips);
        }

        if let Some(port) = adapter_port {
            self.scheduler.adapter_port = port;
            tracing::info!("CLI override: adapter-port set to {}", port);
        }

        if let Some(interval) = interval {
            self.scheduler.reconcile_interval = humantime::parse_duration(interval)
                .with_context(|| format!("Invalid reconcile interval: {}", interval))?;
            tracing::info!("CLI override: reconcile interval set to {}", interval);
        }

        Ok(())
    }

    /// Merge adapter related CLI arguments
    pub fn merge_adapter_cli_args(
        &mut self,
        aggregator_addrs: Option<&str>,
        pool_size: Option<usize>,
        api_bind: Option<SocketAddr>,
    ) -> Result<()> {
        if let Some(addrs) = aggregator_addrs {
            self.adapter.aggregator_addrs =
                addrs.split(',').map(|a| a.trim().to_string()).collect();
            tracing::info!("CLI override: aggregator addresses set to {}", addrs);
        }

        if let Some(size) = pool_size {
            self.adapter.client_pool_size = size;
            tracing::info!("CLI override: client pool size set to {}", size);
        }

        if let Some(addr) = api_bind {
            self.adapter.api_bind_addr = addr;
            tracing::info!("CLI override: binding API address set to {}", addr);
        }

        Ok(())
    }
}
