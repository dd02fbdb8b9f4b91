//! Hardware health refresh.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use hpcwatch_adapters::MetricsSource;
use hpcwatch_cache::{transform_status, CacheStore, JobError, JobReport, Pipeline, StatusMerger};
use hpcwatch_types::EntityUniverse;

use super::write_payload;

pub const HARDWARE_KEY: &str = "hardware-status";

const STATUS_QUERY: &str = "globalSystemStatus";
const UPTIME_QUERY: &str = "systemPowerUpTime";

/// Polls controller health and uptime, damps flapping through the status
/// merger and writes the merged report.
pub struct HardwareJob {
    metrics: Arc<dyn MetricsSource>,
    universe: EntityUniverse,
    merger: Mutex<StatusMerger>,
}

impl HardwareJob {
    pub fn new(metrics: Arc<dyn MetricsSource>, universe: EntityUniverse, depth: usize) -> Self {
        Self {
            merger: Mutex::new(StatusMerger::new(universe.clone(), depth)),
            metrics,
            universe,
        }
    }
}

#[async_trait]
impl Pipeline for HardwareJob {
    fn name(&self) -> &str {
        "hardware"
    }

    fn keys(&self) -> Vec<String> {
        vec![HARDWARE_KEY.to_string()]
    }

    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError> {
        let (status, uptime) = tokio::join!(
            self.metrics.instant(STATUS_QUERY),
            self.metrics.instant(UPTIME_QUERY)
        );

        // Without status rows the cycle would only add placeholders.
        let status = status?;
        let uptime = uptime.unwrap_or_else(|e| {
            warn!(key = HARDWARE_KEY, cause = %e.cause, error = %e.message, "Uptime fetch failed, keeping last known uptimes");
            Vec::new()
        });

        let batch = transform_status(&status, &uptime, &self.universe, Utc::now());
        let report = {
            let mut merger = self.merger.lock();
            merger.ingest(batch);
            merger.report()
        };

        match report {
            Some(report) => write_payload(store, HARDWARE_KEY, &report).await,
            None => Ok(JobReport::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::fake::FakeMetrics;
    use hpcwatch_adapters::FetchError;
    use hpcwatch_cache::MemoryStore;
    use hpcwatch_types::report::HardwareReport;
    use hpcwatch_types::{HealthStatus, Series};

    fn status(node: &str, code: &str) -> Series {
        Series::new()
            .label("instance", format!("{node}:9100"))
            .point(0.0, code)
    }

    fn uptime(node: &str, secs: &str) -> Series {
        Series::new()
            .label("instance", format!("{node}:9100"))
            .point(0.0, secs)
    }

    async fn report(store: &MemoryStore) -> HardwareReport {
        let entry = store.read(HARDWARE_KEY).await.unwrap().unwrap();
        serde_json::from_value(entry.payload).unwrap()
    }

    #[tokio::test]
    async fn writes_every_node_with_placeholders() {
        let metrics = FakeMetrics::new()
            .answer(STATUS_QUERY, vec![status("hopper-01", "3"), status("hopper-02", "5")])
            .answer(UPTIME_QUERY, vec![uptime("hopper-01", "90000")]);
        let job = HardwareJob::new(Arc::new(metrics), EntityUniverse::numbered("hopper-", 3, 2), 5);
        let store = MemoryStore::new();

        let outcome = job.run(&store).await.unwrap();
        assert_eq!(outcome.written, vec![HARDWARE_KEY.to_string()]);

        let report = report(&store).await;
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.nodes[0].status, HealthStatus::Ok);
        assert_eq!(report.nodes[0].uptime_formatted, "1d 1h");
        assert_eq!(report.nodes[1].status, HealthStatus::Critical);
        assert_eq!(report.nodes[2].status_label, "No Data");
        assert_eq!(report.nodes[2].status_value, -1);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.critical, 1);
    }

    #[tokio::test]
    async fn status_failure_leaves_key_untouched() {
        let metrics = FakeMetrics::new().fail(STATUS_QUERY, FetchError::unreachable("timeout"));
        let job = HardwareJob::new(Arc::new(metrics), EntityUniverse::numbered("hopper-", 2, 2), 5);
        let store = MemoryStore::new();

        let err = job.run(&store).await.unwrap_err();
        assert!(matches!(err, JobError::Fetch(_)));
        assert!(store.read(HARDWARE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uptime_failure_keeps_last_known_uptime() {
        let universe = EntityUniverse::numbered("hopper-", 1, 2);
        let store = MemoryStore::new();

        let first = FakeMetrics::new()
            .answer(STATUS_QUERY, vec![status("hopper-01", "3")])
            .answer(UPTIME_QUERY, vec![uptime("hopper-01", "7200")]);
        let job = HardwareJob::new(Arc::new(first), universe.clone(), 5);
        job.run(&store).await.unwrap();

        // Swap the source but keep the merger state
        let second = FakeMetrics::new()
            .answer(STATUS_QUERY, vec![status("hopper-01", "3")])
            .fail(UPTIME_QUERY, FetchError::rejected("bad query"));
        let job = HardwareJob {
            metrics: Arc::new(second),
            ..job
        };
        job.run(&store).await.unwrap();

        let report = report(&store).await;
        assert_eq!(report.nodes[0].uptime_seconds, 7200);
        assert_eq!(report.nodes[0].uptime_formatted, "2h 0m");
    }

    #[tokio::test]
    async fn flapping_node_keeps_worst_recent_status() {
        let universe = EntityUniverse::numbered("hopper-", 1, 2);
        let store = MemoryStore::new();

        let warning = FakeMetrics::new().answer(STATUS_QUERY, vec![status("hopper-01", "4")]);
        let job = HardwareJob::new(Arc::new(warning), universe, 5);
        job.run(&store).await.unwrap();

        // Node drops out of the scrape: the warning is still shown
        let empty = FakeMetrics::new();
        let job = HardwareJob {
            metrics: Arc::new(empty),
            ..job
        };
        job.run(&store).await.unwrap();

        let report = report(&store).await;
        assert_eq!(report.nodes[0].status, HealthStatus::Warning);
        assert_eq!(report.nodes[0].status_label, "Warning");
    }
}
