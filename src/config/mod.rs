//! Configuration Module
//!
//! Handles configuration loading, validation, and management.

pub mod manager;
pub mod tls;
pub mod types;

pub use manager::{parse_adapter_addrs, ConfigManager};
pub use tls::MutualTlsConfig;
pub use types::*;
