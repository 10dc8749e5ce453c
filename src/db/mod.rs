//! Persistence: an opaque key-value store and the typed records kept in it.
//!
//! This module is split into two submodules:
//! - `repo`: the SQLite-backed key-value table and pool setup.
//! - `state`: typed, corruption-tolerant accessors for each persisted record.
//!
//! Display reads never fail: a missing, unreadable or undecodable record is
//! reported as absent. Read-modify-write paths use the fallible accessors so a
//! storage error never overwrites a record with a default. Writes return
//! [`StoreError`] so callers can decide whether the loss matters.

use async_trait::async_trait;
use thiserror::Error;

pub mod repo;
pub mod state;

pub use repo::{init_pool, run_migrations, Pool, SqliteKv};
pub use state::StateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Minimal get/set store for serialized records.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Write only when `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    /// Remove `key` only while it still holds `expected`.
    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}
