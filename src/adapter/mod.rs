//! Adapter Module
//!
//! The data plane: a pool of rotating egress connections to the aggregator,
//! the binding API the scheduler drives, and the per-binding subscriptions
//! that forward envelopes to syslog drains.

pub mod balancer;
pub mod client_manager;
pub mod connector;
pub mod egress;
pub mod server;
pub mod store;
pub mod subscriber;

pub use balancer::Balancer;
pub use client_manager::{ClientManager, ClientManagerOptions};
pub use connector::{Connect, Connector, DialOpts};
pub use egress::{EgressRequest, EgressStreamer, Envelope};
pub use server::BindingApiServer;
pub use store::BindingStore;
pub use subscriber::SubscriptionManager;
