//! Concrete refresh pipelines.
//!
//! | Job | Keys | Source |
//! |---|---|---|
//! | `hardware` | `hardware-status` | metrics, merged over a 5 sample window |
//! | `power` | `power-status` | metrics, merged over a 3 sample window |
//! | `overview` | `cluster-stats`, `job-summary`, `node-details` | metrics |
//! | `analytics` | `job-analytics-*`, `resource-analytics-*`, `gpu-occupation-*`, `power-history-*` | metrics range queries |
//! | `aggregate` | `gpu-usage-by-user`, `job-stats-*`, `*-wait-time-*`, `monthly-gpu-hours` | warehouse |

mod aggregate;
mod analytics;
mod hardware;
mod overview;
mod power;

pub use aggregate::AggregateJob;
pub use analytics::AnalyticsJob;
pub use hardware::{HardwareJob, HARDWARE_KEY};
pub use overview::OverviewJob;
pub use power::{PowerJob, POWER_KEY};

use serde::Serialize;

use hpcwatch_cache::{CacheStore, JobError, JobReport};
use hpcwatch_types::{scalar, Series};

/// Serialize `payload` and write it under `key`.
async fn write_payload<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    payload: &T,
) -> Result<JobReport, JobError> {
    let value = serde_json::to_value(payload).map_err(|source| JobError::Payload {
        key: key.to_string(),
        source,
    })?;
    store.write(key, value).await?;
    Ok(JobReport::single(key))
}

/// A non-negative count from a series value. Fractions are truncated.
fn to_count(value: f64) -> u64 {
    if value > 0.0 {
        value as u64
    } else {
        0
    }
}

/// The count carried by a single-series query, or 0 if it returned nothing.
fn count(rows: &[Series]) -> u64 {
    scalar(rows).map(to_count).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory sources for pipeline tests.

    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use hpcwatch_adapters::{FetchError, MetricsSource, WarehouseSource};
    use hpcwatch_types::report::{DailyJobStats, MonthlyGpuHours, QueueWait, UserGpuHours};
    use hpcwatch_types::{RangeWindow, RowSet, Series};

    /// Answers queries from a fixed table. Unknown queries return no rows.
    #[derive(Default)]
    pub struct FakeMetrics {
        answers: HashMap<String, Result<RowSet, FetchError>>,
        pub windows: Mutex<Vec<RangeWindow>>,
    }

    impl FakeMetrics {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(mut self, query: &str, rows: RowSet) -> Self {
            self.answers.insert(query.to_string(), Ok(rows));
            self
        }

        pub fn fail(mut self, query: &str, error: FetchError) -> Self {
            self.answers.insert(query.to_string(), Err(error));
            self
        }

        /// Single scalar answer.
        pub fn value(self, query: &str, value: &str) -> Self {
            self.answer(query, vec![Series::new().point(0.0, value)])
        }

        fn lookup(&self, query: &str) -> Result<RowSet, FetchError> {
            self.answers.get(query).cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[async_trait]
    impl MetricsSource for FakeMetrics {
        async fn instant(&self, query: &str) -> Result<RowSet, FetchError> {
            self.lookup(query)
        }

        async fn range(&self, query: &str, window: &RangeWindow) -> Result<RowSet, FetchError> {
            self.windows.lock().push(*window);
            self.lookup(query)
        }
    }

    /// Warehouse returning canned reports, or failing every call.
    #[derive(Default)]
    pub struct FakeWarehouse {
        pub users: Vec<UserGpuHours>,
        pub stats: Vec<DailyJobStats>,
        pub months: Vec<MonthlyGpuHours>,
        pub wait_error: Option<FetchError>,
        pub down: bool,
        pub wait_calls: Mutex<Vec<(Vec<String>, u32)>>,
    }

    impl FakeWarehouse {
        fn check(&self) -> Result<(), FetchError> {
            if self.down {
                Err(FetchError::unreachable("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl WarehouseSource for FakeWarehouse {
        async fn gpu_usage_by_user(&self) -> Result<Vec<UserGpuHours>, FetchError> {
            self.check()?;
            Ok(self.users.clone())
        }

        async fn job_stats(&self, days: u32) -> Result<Vec<DailyJobStats>, FetchError> {
            self.check()?;
            Ok(self.stats.iter().take(days as usize).cloned().collect())
        }

        async fn queue_wait(&self, queues: &[&str], days: u32) -> Result<Vec<QueueWait>, FetchError> {
            self.check()?;
            self.wait_calls
                .lock()
                .push((queues.iter().map(|q| q.to_string()).collect(), days));
            if let Some(error) = &self.wait_error {
                return Err(error.clone());
            }
            Ok(queues
                .iter()
                .map(|queue| QueueWait {
                    date: "2024-03-01".to_string(),
                    queue_name: queue.to_string(),
                    num_jobs: u64::from(days),
                    total_gpu_hours: 1.5,
                    avg_gpu_hours_per_job: 0.75,
                    avg_wait_minutes: 12.0,
                })
                .collect())
        }

        async fn monthly_gpu_hours(&self) -> Result<Vec<MonthlyGpuHours>, FetchError> {
            self.check()?;
            Ok(self.months.clone())
        }
    }
}
