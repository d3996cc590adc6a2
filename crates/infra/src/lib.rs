//! # tiercache infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - SQLite persistent store (r2d2 pool, schema migrations)
//! - reqwest HTTP transport
//! - Host-driven connectivity status
//! - Configuration loading, logging setup and maintenance schedulers
//!
//! ## Architecture
//! - Implements traits defined in `tiercache-core`
//! - Contains all "impure" code (I/O, network, filesystem)
//! - [`CacheContext`] wires everything together for production use

pub mod config;
pub mod connectivity;
pub mod context;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use connectivity::NetworkStatus;
pub use context::CacheContext;
pub use database::{DbManager, SqliteKeyValueStore};
pub use errors::InfraError;
pub use http::ReqwestTransport;
pub use observability::{init_tracing, LogFormat};
pub use scheduling::{ReplayScheduler, SchedulerError, SweepScheduler};
