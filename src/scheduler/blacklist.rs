//! Destination Blacklist Filter
//!
//! Validates syslog drain destinations against configured IPv4 ranges so
//! that drains can never point log traffic at protected addresses.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised while building or applying the blacklist
#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("invalid IP address for blacklist range: {0}")]
    InvalidAddress(String),
    #[error("invalid blacklist range: Start {start} has to be before End {end}")]
    InvalidRange { start: String, end: String },
    #[error("invalid drain URL: {0}")]
    InvalidUrl(String),
    #[error("failed to resolve drain host: {0}")]
    ResolutionFailed(String),
    #[error("drain destination {0} is blacklisted")]
    Blacklisted(Ipv4Addr),
}

/// One inclusive IPv4 range, as configured
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlacklistRange {
    pub start: String,
    pub end: String,
}

/// Validated set of blacklisted IPv4 ranges
#[derive(Debug, Clone, Default)]
pub struct BlacklistRanges {
    ranges: Vec<(u32, u32)>,
}

impl BlacklistRanges {
    /// Validate and build the filter. Any bad endpoint rejects the whole set.
    pub fn new<I>(ranges: I) -> Result<Self, BlacklistError>
    where
        I: IntoIterator<Item = BlacklistRange>,
    {
        let mut parsed = Vec::new();
        for range in ranges {
            let start = parse_ipv4(&range.start)?;
            let end = parse_ipv4(&range.end)?;

            // compared as unsigned 32-bit big-endian integers
            let (start, end) = (u32::from(start), u32::from(end));
            if start > end {
                return Err(BlacklistError::InvalidRange {
                    start: range.start,
                    end: range.end,
                });
            }
            parsed.push((start, end));
        }

        Ok(Self { ranges: parsed })
    }

    /// Rejects an address lying inside any configured range. An empty filter
    /// allows every address.
    pub fn check(&self, ip: Ipv4Addr) -> Result<(), BlacklistError> {
        let addr = u32::from(ip);
        for &(start, end) in &self.ranges {
            if addr >= start && addr <= end {
                return Err(BlacklistError::Blacklisted(ip));
            }
        }
        Ok(())
    }

    /// Extract the host component of a drain URL. The scheme is arbitrary
    /// but an authority must be present.
    pub fn parse_host(&self, drain: &str) -> Result<String, BlacklistError> {
        let url =
            url::Url::parse(drain).map_err(|_| BlacklistError::InvalidUrl(drain.to_string()))?;

        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(host.to_string()),
            _ => Err(BlacklistError::InvalidUrl(drain.to_string())),
        }
    }

    /// Resolve a drain host to a single IPv4 address.
    pub async fn resolve_addr(&self, host: &str) -> Result<Ipv4Addr, BlacklistError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| BlacklistError::ResolutionFailed(host.to_string()))?;

        for addr in addrs {
            if let std::net::IpAddr::V4(ip) = addr.ip() {
                return Ok(ip);
            }
        }

        Err(BlacklistError::ResolutionFailed(host.to_string()))
    }
}

fn parse_ipv4(addr: &str) -> Result<Ipv4Addr, BlacklistError> {
    addr.parse::<Ipv4Addr>()
        .map_err(|_| BlacklistError::InvalidAddress(addr.to_string()))
}
