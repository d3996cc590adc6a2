//! Error conversions for infrastructure adapters.

pub mod conversions;

pub use conversions::{InfraError, IntoNetworkError};
