//! Read side of the cache: what an API layer sees for a key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use hpcwatch_cache::{CacheStore, StoreError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The key has never been written since the cache directory was created.
    #[error("'{0}' is not ready yet")]
    NotReady(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A cached payload with its write time and age.
///
/// Staleness is reported through `age`, never as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the payload was written.
    pub age: i64,
    pub data: Value,
}

impl Snapshot {
    pub fn is_older_than(&self, max_age: std::time::Duration) -> bool {
        self.age.unsigned_abs() > max_age.as_secs()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
    store: Arc<dyn CacheStore>,
}

impl SnapshotReader {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, key: &str) -> Result<Snapshot, SnapshotError> {
        self.read_at(key, Utc::now()).await
    }

    /// Read `key`, computing its age relative to `now`.
    pub async fn read_at(&self, key: &str, now: DateTime<Utc>) -> Result<Snapshot, SnapshotError> {
        let entry = self
            .store
            .read(key)
            .await?
            .ok_or_else(|| SnapshotError::NotReady(key.to_string()))?;

        Ok(Snapshot {
            age: entry.age_at(now).num_seconds(),
            key: entry.key,
            timestamp: entry.timestamp,
            data: entry.payload,
        })
    }
}
