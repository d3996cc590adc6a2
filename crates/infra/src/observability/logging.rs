//! `tracing-subscriber` installation
//!
//! The filter comes from `RUST_LOG` when set, otherwise `info`. Installing
//! twice is harmless: the second call reports `false` and leaves the first
//! subscriber in place.

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local development
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Installs the global subscriber. Returns `true` if this call installed it.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).try_init(),
    };
    installed.is_ok()
}
