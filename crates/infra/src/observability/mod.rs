//! Logging setup for hosts embedding tiercache

pub mod logging;

pub use logging::{init_tracing, LogFormat};
