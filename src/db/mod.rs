//! Persistent tier of the page cache.
//!
//! The cache only needs a flat string key/value store, so every backing
//! technology sits behind [`KeyValueStore`].

pub mod connection;
pub mod kv;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use kv::SqliteStore;
pub use memory::MemoryStore;

pub const INIT_SCHEMA: &str = r#"
-- Serialized cache entries keyed by cache key
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key/value contract for the persistent cache tier
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
