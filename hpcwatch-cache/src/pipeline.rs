//! Refresh pipelines and the sub-job runner.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use hpcwatch_adapters::FetchError;

use crate::store::{CacheStore, StoreError};

/// Errors surfaced at a job boundary.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("payload for '{key}' could not be serialized: {source}")]
    Payload {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Some sub-jobs failed; their keys were left untouched.
    #[error("{failed} of {total} sub-jobs failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

/// Keys written by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub written: Vec<String>,
}

impl JobReport {
    pub fn single(key: impl Into<String>) -> Self {
        Self {
            written: vec![key.into()],
        }
    }
}

/// A named refresh pipeline driven by the scheduler.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Job name used in logs.
    fn name(&self) -> &str;

    /// Every cache key this pipeline may write.
    fn keys(&self) -> Vec<String>;

    /// Fetch, transform and write. Must not panic; the scheduler contains
    /// panics but logs them as errors.
    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError>;
}

impl std::fmt::Debug for dyn Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("name", &self.name()).finish()
    }
}

/// One independently written key within a pipeline.
pub struct SubJob<'a> {
    key: String,
    fetch: BoxFuture<'a, Result<Value, JobError>>,
}

impl<'a> SubJob<'a> {
    /// Create a sub-job that writes the result of `fetch` under `key`.
    pub fn new<F, T>(key: impl Into<String>, fetch: F) -> Self
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'a,
        T: Serialize,
    {
        let key = key.into();
        let payload_key = key.clone();
        let fetch = fetch
            .map(move |result| {
                let payload = result?;
                serde_json::to_value(payload).map_err(|source| JobError::Payload {
                    key: payload_key,
                    source,
                })
            })
            .boxed();
        Self { key, fetch }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for SubJob<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubJob").field("key", &self.key).finish()
    }
}

/// Run sub-jobs concurrently, writing each key as soon as its own fetch
/// completes.
///
/// A failing sub-job is logged and leaves its key untouched; siblings are
/// unaffected. Returns [`JobError::PartialFailure`] if any sub-job failed.
pub async fn run_sub_jobs(
    job: &str,
    store: &dyn CacheStore,
    sub_jobs: Vec<SubJob<'_>>,
) -> Result<JobReport, JobError> {
    let total = sub_jobs.len();

    let outcomes = join_all(sub_jobs.into_iter().map(|sub| async move {
        let result = match sub.fetch.await {
            Ok(payload) => store
                .write(&sub.key, payload)
                .await
                .map(|_| ())
                .map_err(JobError::from),
            Err(e) => Err(e),
        };
        (sub.key, result)
    }))
    .await;

    let mut report = JobReport::default();
    let mut failed = 0;
    for (key, result) in outcomes {
        match result {
            Ok(()) => {
                info!(job, key = %key, "Cache updated");
                report.written.push(key);
            }
            Err(JobError::Fetch(e)) => {
                warn!(job, key = %key, cause = %e.cause, error = %e.message, "Sub-job fetch failed");
                failed += 1;
            }
            Err(e) => {
                warn!(job, key = %key, error = %e, "Sub-job failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(JobError::PartialFailure { failed, total })
    } else {
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn failed_sub_job_leaves_its_key_untouched() {
        let store = MemoryStore::new();
        store.write("a", json!("old")).await.unwrap();

        let sub_jobs = vec![
            SubJob::new("a", async { Err::<Value, _>(FetchError::unreachable("down")) }),
            SubJob::new("b", async { Ok(json!({"fresh": true})) }),
        ];

        let err = run_sub_jobs("test", &store, sub_jobs).await.unwrap_err();
        assert!(matches!(err, JobError::PartialFailure { failed: 1, total: 2 }));

        assert_eq!(store.read("a").await.unwrap().unwrap().payload, json!("old"));
        assert_eq!(
            store.read("b").await.unwrap().unwrap().payload,
            json!({"fresh": true})
        );
    }

    #[tokio::test]
    async fn all_successful_sub_jobs_are_reported() {
        let store = MemoryStore::new();
        let sub_jobs = vec![
            SubJob::new("x", async { Ok(vec![1, 2, 3]) }),
            SubJob::new("y", async { Ok("text") }),
        ];

        let report = run_sub_jobs("test", &store, sub_jobs).await.unwrap();
        assert_eq!(report.written, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(store.read("x").await.unwrap().unwrap().payload, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn store_failure_counts_as_sub_job_failure() {
        let store = MemoryStore::new();
        let sub_jobs = vec![
            SubJob::new("bad/key", async { Ok(1) }),
            SubJob::new("good", async { Ok(2) }),
        ];

        let err = run_sub_jobs("test", &store, sub_jobs).await.unwrap_err();
        assert!(matches!(err, JobError::PartialFailure { failed: 1, total: 2 }));
        assert!(store.read("good").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_sub_job_list_is_ok() {
        let store = MemoryStore::new();
        let report = run_sub_jobs("test", &store, Vec::new()).await.unwrap();
        assert!(report.written.is_empty());
    }
}
