//! drainscale Library
//!
//! A scalable syslog forwarding control plane and data plane: a scheduler
//! reconciles app-to-drain bindings onto a pool of adapters, and each
//! adapter maintains a rotating pool of egress connections to the log
//! aggregator while forwarding envelopes to syslog drains.

pub mod adapter;
pub mod bindings;
pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod shutdown;

pub use config::Config;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the daemons
pub type Result<T> = anyhow::Result<T>;
