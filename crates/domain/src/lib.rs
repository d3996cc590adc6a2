//! # tiercache domain
//!
//! Value types shared by every tiercache crate.
//!
//! This crate contains:
//! - Cache entry, partition and value types
//! - HTTP request/response and fetch option types
//! - Error types and the `Result` alias
//! - Configuration structures and defaults
//!
//! ## Architecture
//! - Depends only on the foundation tier of `tiercache-common`
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
