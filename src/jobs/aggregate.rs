//! Hourly warehouse reports.

use std::sync::Arc;

use async_trait::async_trait;

use hpcwatch_adapters::WarehouseSource;
use hpcwatch_cache::{run_sub_jobs, CacheStore, JobError, JobReport, Pipeline, SubJob};

const AISG_QUEUES: [&str; 3] = ["AISG_large", "AISG_debug", "AISG_guest"];
const NUSIT_QUEUES: [&str; 5] = ["small", "interactive", "medium", "special", "large"];

/// Report windows, in days.
const WINDOWS: [u32; 3] = [1, 7, 30];

const GPU_USAGE_KEY: &str = "gpu-usage-by-user";
const JOB_STATS_PREFIX: &str = "job-stats";
const AISG_WAIT_PREFIX: &str = "aisg-wait-time";
const NUSIT_WAIT_PREFIX: &str = "nusit-wait-time";
const MONTHLY_KEY: &str = "monthly-gpu-hours";

fn window_key(prefix: &str, days: u32) -> String {
    format!("{prefix}-{days}d")
}

/// Every key written, in sub-job order.
fn report_keys() -> Vec<String> {
    let mut keys = vec![GPU_USAGE_KEY.to_string()];
    for prefix in [JOB_STATS_PREFIX, AISG_WAIT_PREFIX, NUSIT_WAIT_PREFIX] {
        keys.extend(WINDOWS.map(|days| window_key(prefix, days)));
    }
    keys.push(MONTHLY_KEY.to_string());
    keys
}

/// Refreshes the job accounting reports, one key per report and window.
pub struct AggregateJob {
    warehouse: Arc<dyn WarehouseSource>,
}

impl AggregateJob {
    pub fn new(warehouse: Arc<dyn WarehouseSource>) -> Self {
        Self { warehouse }
    }

    fn sub_jobs(&self) -> Vec<SubJob<'_>> {
        let warehouse = &self.warehouse;
        let mut sub_jobs = vec![SubJob::new(GPU_USAGE_KEY, warehouse.gpu_usage_by_user())];

        for days in WINDOWS {
            sub_jobs.push(SubJob::new(
                window_key(JOB_STATS_PREFIX, days),
                warehouse.job_stats(days),
            ));
        }
        for days in WINDOWS {
            sub_jobs.push(SubJob::new(
                window_key(AISG_WAIT_PREFIX, days),
                warehouse.queue_wait(&AISG_QUEUES, days),
            ));
        }
        for days in WINDOWS {
            sub_jobs.push(SubJob::new(
                window_key(NUSIT_WAIT_PREFIX, days),
                warehouse.queue_wait(&NUSIT_QUEUES, days),
            ));
        }

        sub_jobs.push(SubJob::new(MONTHLY_KEY, warehouse.monthly_gpu_hours()));
        sub_jobs
    }
}

#[async_trait]
impl Pipeline for AggregateJob {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn keys(&self) -> Vec<String> {
        report_keys()
    }

    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError> {
        run_sub_jobs(self.name(), store, self.sub_jobs()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::fake::FakeWarehouse;
    use hpcwatch_adapters::FetchError;
    use hpcwatch_cache::MemoryStore;
    use hpcwatch_types::report::{DailyJobStats, MonthlyGpuHours, UserGpuHours};
    use serde_json::json;

    fn warehouse() -> FakeWarehouse {
        FakeWarehouse {
            users: vec![UserGpuHours {
                username: "alice".to_string(),
                num_jobs: 12,
                total_gpus_used: 48,
                avg_gpus_per_job: 4.0,
                total_gpu_hours: 310.25,
                avg_gpu_hours_per_job: 25.85,
            }],
            stats: (1..=30)
                .map(|day| DailyJobStats {
                    job_date: format!("2024-03-{day:02}"),
                    num_jobs: day,
                    total_gpu_hours: 10.0,
                })
                .collect(),
            months: vec![MonthlyGpuHours {
                month: "Mar 2024".to_string(),
                gpu_hours: 1234.5,
            }],
            ..FakeWarehouse::default()
        }
    }

    #[tokio::test]
    async fn writes_every_report() {
        let job = AggregateJob::new(Arc::new(warehouse()));
        let store = MemoryStore::new();

        let report = job.run(&store).await.unwrap();
        assert_eq!(report.written.len(), 11);
        assert_eq!(store.len(), 11);

        let users = store.read("gpu-usage-by-user").await.unwrap().unwrap();
        assert_eq!(users.payload[0]["username"], json!("alice"));
        assert_eq!(users.payload[0]["totalGpuHours"], json!(310.25));

        let week = store.read("job-stats-7d").await.unwrap().unwrap();
        assert_eq!(week.payload.as_array().unwrap().len(), 7);

        let months = store.read("monthly-gpu-hours").await.unwrap().unwrap();
        assert_eq!(months.payload, json!([{"month": "Mar 2024", "gpuHours": 1234.5}]));
    }

    #[tokio::test]
    async fn wait_time_reports_use_their_queue_sets() {
        let warehouse = Arc::new(warehouse());
        let job = AggregateJob::new(warehouse.clone());
        job.run(&MemoryStore::new()).await.unwrap();

        let calls = warehouse.wait_calls.lock().clone();
        assert_eq!(calls.len(), 6);
        let aisg: Vec<String> = AISG_QUEUES.iter().map(|q| q.to_string()).collect();
        assert!(calls.contains(&(aisg, 30)));
        assert!(calls
            .iter()
            .any(|(queues, days)| *days == 1 && queues.len() == 5 && queues[1] == "interactive"));
    }

    #[tokio::test]
    async fn schema_mismatch_only_fails_wait_time_reports() {
        let warehouse = FakeWarehouse {
            wait_error: Some(FetchError::schema_mismatch("no wait column in job_tasks")),
            ..warehouse()
        };
        let job = AggregateJob::new(Arc::new(warehouse));
        let store = MemoryStore::new();

        let err = job.run(&store).await.unwrap_err();
        assert!(matches!(err, JobError::PartialFailure { failed: 6, total: 11 }));
        assert!(store.read("aisg-wait-time-1d").await.unwrap().is_none());
        assert!(store.read("job-stats-30d").await.unwrap().is_some());
        assert!(store.read("monthly-gpu-hours").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_warehouse_keeps_previous_reports() {
        let store = MemoryStore::new();
        AggregateJob::new(Arc::new(warehouse())).run(&store).await.unwrap();
        let before = store.read("job-stats-1d").await.unwrap().unwrap();

        let down = FakeWarehouse {
            down: true,
            ..FakeWarehouse::default()
        };
        let err = AggregateJob::new(Arc::new(down)).run(&store).await.unwrap_err();
        assert!(matches!(err, JobError::PartialFailure { failed: 11, total: 11 }));

        let after = store.read("job-stats-1d").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn keys_are_stable() {
        let job = AggregateJob::new(Arc::new(FakeWarehouse::default()));
        assert_eq!(
            job.keys(),
            vec![
                "gpu-usage-by-user",
                "job-stats-1d",
                "job-stats-7d",
                "job-stats-30d",
                "aisg-wait-time-1d",
                "aisg-wait-time-7d",
                "aisg-wait-time-30d",
                "nusit-wait-time-1d",
                "nusit-wait-time-7d",
                "nusit-wait-time-30d",
                "monthly-gpu-hours",
            ]
        );

        let sub_job_keys: Vec<_> = job.sub_jobs().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(job.keys(), sub_job_keys);
    }
}
