//! Snapshot store backends.
//!
//! The store maps a key to the last payload written under it. A write fully
//! replaces the previous entry; there is no eviction.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use hpcwatch_types::CacheEntry;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key contains characters outside `[A-Za-z0-9._-]`.
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),

    #[error("cache I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("cache record for '{key}' is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key to payload map.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Replace the entry for `key`, stamping it with the current time.
    async fn write(&self, key: &str, payload: Value) -> Result<CacheEntry, StoreError>;

    /// The last entry written under `key`, or `None` if it was never written.
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;
}

impl std::fmt::Debug for dyn CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CacheStore")
    }
}

/// Check that a key is non-empty, does not start with a dot and only uses
/// `[A-Za-z0-9._-]`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// On-disk record format.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    timestamp: DateTime<Utc>,
    data: Value,
}

/// Store that keeps one JSON file per key: `{dir}/{key}.json`.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a reader sees either the old record or the new one.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn io_error(key: &str) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn write(&self, key: &str, payload: Value) -> Result<CacheEntry, StoreError> {
        validate_key(key)?;

        let entry = CacheEntry::now(key, payload);
        let record = Record {
            timestamp: entry.timestamp,
            data: entry.payload.clone(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|source| {
            StoreError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(key))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{key}.json.{seq}.tmp"));
        let path = self.path_for(key);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(Self::io_error(key))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Self::io_error(key)(e));
        }

        debug!(key, path = %path.display(), "Wrote cache record");
        Ok(entry)
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        validate_key(key)?;

        let bytes = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(key)(e)),
        };

        let record: Record =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })?;

        Ok(Some(CacheEntry::with_timestamp(
            key,
            record.timestamp,
            record.data,
        )))
    }
}

/// In-process store, used for tests and for `once` runs without a cache
/// directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys written so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn write(&self, key: &str, payload: Value) -> Result<CacheEntry, StoreError> {
        validate_key(key)?;
        let entry = CacheEntry::now(key, payload);
        self.entries.write().insert(key.to_string(), entry.clone());
        Ok(entry)
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }
}
