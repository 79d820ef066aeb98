//! Aggregator Host Balancer

use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("no aggregator hosts to balance across")]
pub struct NoHostError;

/// Rotates over a static list of aggregator host:port entries so repeated
/// dials spread across the aggregator nodes.
#[derive(Debug)]
pub struct Balancer {
    addrs: Vec<String>,
    next: Mutex<usize>,
}

impl Balancer {
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            addrs,
            next: Mutex::new(0),
        }
    }

    /// Return the next host:port in round-robin order. Fails fast when the
    /// candidate list is empty.
    pub fn next_host_port(&self) -> Result<String, NoHostError> {
        if self.addrs.is_empty() {
            return Err(NoHostError);
        }

        let mut next = self
            .next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let addr = self.addrs[*next].clone();
        *next = (*next + 1) % self.addrs.len();

        Ok(addr)
    }
}
