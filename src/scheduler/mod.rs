//! Scheduler Module
//!
//! The control plane: reads desired bindings, filters drains against the
//! destination blacklist, and reconciles the adapter fleet.

pub mod blacklist;
pub mod orchestrator;
pub mod pool;
pub mod reader;

pub use blacklist::{BlacklistRange, BlacklistRanges};
pub use orchestrator::Orchestrator;
pub use pool::HttpAdapterPool;
pub use reader::CupsReader;
