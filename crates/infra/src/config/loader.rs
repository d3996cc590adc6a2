//! Configuration loader
//!
//! Loads tiercache configuration from files and environment variables.
//!
//! ## Loading Strategy
//! 1. Start from the first config file found by [`probe_config_paths`], or
//!    from defaults when there is none
//! 2. Apply `TIERCACHE_*` environment variables on top
//! 3. Validate the result
//!
//! ## Environment Variables
//! - `TIERCACHE_CONFIG`: Explicit config file path (skips probing)
//! - `TIERCACHE_DB_PATH`: Database file path
//! - `TIERCACHE_DB_POOL_SIZE`: Connection pool size
//! - `TIERCACHE_MAX_MEMORY_ITEMS`: Memory tier capacity
//! - `TIERCACHE_DEFAULT_TTL_MS`: Default entry TTL in milliseconds
//! - `TIERCACHE_FETCH_TIMEOUT_MS`: Per-attempt network timeout
//! - `TIERCACHE_RETRY_ATTEMPTS`: Network attempts per fetch
//! - `TIERCACHE_RETRY_DELAY_MS`: Base retry backoff
//! - `TIERCACHE_OFFLINE_FALLBACK`: Serve cached copies when offline (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./tiercache.toml`, `./tiercache.json`, `./config.toml`, `./config.json`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tiercache_domain::{CacheError, Config, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["tiercache.toml", "tiercache.json", "config.toml", "config.json"];

/// Load configuration with the layered strategy described above.
///
/// # Errors
/// Returns `CacheError::Config` if a file or variable is malformed or the
/// merged configuration fails validation.
pub fn load() -> Result<Config> {
    let explicit = std::env::var("TIERCACHE_CONFIG").ok().map(PathBuf::from);
    let mut config = match explicit.or_else(probe_config_paths) {
        Some(path) => read_config_file(&path)?,
        None => {
            tracing::debug!("No config file found, starting from defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    tracing::info!(
        db_path = %config.storage.path.display(),
        max_memory_items = config.cache.max_memory_items,
        "Configuration loaded"
    );
    Ok(config)
}

/// Load configuration from defaults plus environment variables only.
///
/// # Errors
/// Returns `CacheError::Config` if a variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Overwrite fields of `config` for every `TIERCACHE_*` variable that is set.
///
/// # Errors
/// Returns `CacheError::Config` naming the variable that failed to parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(path) = env_opt("TIERCACHE_DB_PATH") {
        config.storage.path = PathBuf::from(path);
    }
    if let Some(size) = env_parse::<u32>("TIERCACHE_DB_POOL_SIZE")? {
        config.storage.pool_size = size;
    }
    if let Some(items) = env_parse::<usize>("TIERCACHE_MAX_MEMORY_ITEMS")? {
        config.cache.max_memory_items = items;
    }
    if let Some(ttl) = env_millis("TIERCACHE_DEFAULT_TTL_MS")? {
        config.cache.default_ttl = ttl;
    }
    if let Some(timeout) = env_millis("TIERCACHE_FETCH_TIMEOUT_MS")? {
        config.fetch.timeout = timeout;
    }
    if let Some(attempts) = env_parse::<u32>("TIERCACHE_RETRY_ATTEMPTS")? {
        config.fetch.retry_attempts = attempts;
    }
    if let Some(delay) = env_millis("TIERCACHE_RETRY_DELAY_MS")? {
        config.fetch.retry_delay = delay;
    }
    config.fetch.offline_fallback =
        env_bool("TIERCACHE_OFFLINE_FALLBACK", config.fetch.offline_fallback);
    Ok(())
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Missing fields take their defaults.
///
/// # Errors
/// Returns `CacheError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The parsed configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => p,
        None => probe_config_paths().ok_or_else(|| {
            CacheError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    let config = read_config_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(CacheError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| CacheError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CacheError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CacheError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(CacheError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional environment variable.
///
/// # Errors
/// Returns `CacheError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CacheError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
