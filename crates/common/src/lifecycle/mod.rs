//! Lifecycle management for async services
//!
//! - **[`manager`]**: the [`Lifecycle`] trait, status tracking and health
//!   reports

pub mod manager;

pub use manager::{ComponentHealth, Lifecycle, ManagerHealth, ManagerStatus, StatusCell};
