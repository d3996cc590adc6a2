//! Database connection manager backed by an r2d2 SQLite pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use tiercache_domain::{CacheError, Result, StorageSettings};
use tracing::{info, warn};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Connection checked out of the pool.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager that owns the connection pool for one database file.
#[derive(Debug)]
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    /// Open (creating if needed) the database described by `settings`.
    ///
    /// Every pooled connection gets the same pragmas: WAL journal when
    /// enabled, `synchronous=NORMAL` and the configured busy timeout.
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        let path = settings.path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::persistence(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let enable_wal = settings.enable_wal;
        let busy_timeout = settings.busy_timeout;
        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| apply_connection_pragmas(conn, enable_wal, busy_timeout));

        let pool = Pool::builder()
            .max_size(settings.pool_size.max(1))
            .connection_timeout(busy_timeout.max(Duration::from_secs(1)))
            .build(manager)
            .map_err(|e| {
                warn!(db_path = %path.display(), error = %e, "failed to create connection pool");
                CacheError::from(InfraError::from(e))
            })?;

        info!(
            db_path = %path.display(),
            max_connections = settings.pool_size.max(1),
            wal = enable_wal,
            "sqlite pool initialised"
        );

        Ok(Self { pool, path })
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(|e| InfraError::from(e).into())
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn)
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_connections(&self) -> u32 {
        self.pool.max_size()
    }

    /// Verify the database is reachable by running a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

fn apply_connection_pragmas(
    conn: &mut Connection,
    enable_wal: bool,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();
    if enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(busy_timeout)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> CacheError {
    CacheError::from(InfraError::from(err))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn settings(dir: &TempDir) -> StorageSettings {
        StorageSettings { path: dir.path().join("cache.db"), ..StorageSettings::default() }
    }

    #[test]
    fn migrations_create_schema_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(&settings(&temp_dir)).expect("manager created");
        manager.run_migrations().expect("migrations run");
        manager.run_migrations().expect("migrations are idempotent");

        let conn = manager.get_connection().expect("connection acquired");
        let version: i32 =
            conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn connections_use_wal_journal() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(&settings(&temp_dir)).expect("manager created");

        let conn = manager.get_connection().unwrap();
        let journal_mode: String =
            conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }

    #[test]
    fn health_check_succeeds_for_valid_database() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(&settings(&temp_dir)).expect("manager created");
        manager.run_migrations().expect("migrations run");

        manager.health_check().expect("health check passed");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let nested = StorageSettings {
            path: temp_dir.path().join("a").join("b").join("cache.db"),
            ..StorageSettings::default()
        };

        let manager = DbManager::new(&nested).expect("manager created");
        manager.run_migrations().unwrap();
        assert!(manager.path().exists());
    }

    #[test]
    fn unreachable_path_is_persistence_unavailable() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let bad = StorageSettings { path: blocker.join("cache.db"), ..StorageSettings::default() };

        let err = DbManager::new(&bad).unwrap_err();
        assert_eq!(err.label(), "persistence_unavailable");
    }
}
