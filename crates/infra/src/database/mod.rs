//! SQLite implementation of the persistent tier's storage port

pub mod kv_store;
pub mod manager;

pub use kv_store::SqliteKeyValueStore;
pub use manager::{DbManager, PooledConnection};
