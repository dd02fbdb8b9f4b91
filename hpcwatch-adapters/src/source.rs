//! Traits implemented by every source adapter.
//!
//! Jobs depend on these traits rather than on the concrete HTTP or SQL
//! adapters, so tests can drive the pipelines with in-memory fakes.

use async_trait::async_trait;

use hpcwatch_types::report::{DailyJobStats, MonthlyGpuHours, QueueWait, UserGpuHours};
use hpcwatch_types::{RangeWindow, RowSet};

use crate::FetchError;

/// A time-series metrics backend.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` at the current instant.
    async fn instant(&self, query: &str) -> Result<RowSet, FetchError>;

    /// Evaluate `query` over `[window.start, window.end]` at `window.step`.
    async fn range(&self, query: &str, window: &RangeWindow) -> Result<RowSet, FetchError>;
}

/// The job accounting warehouse.
#[async_trait]
pub trait WarehouseSource: Send + Sync {
    /// Top users by GPU hours over the last 7 days.
    async fn gpu_usage_by_user(&self) -> Result<Vec<UserGpuHours>, FetchError>;

    /// Per-day GPU job count and GPU hours over the last `days` days.
    async fn job_stats(&self, days: u32) -> Result<Vec<DailyJobStats>, FetchError>;

    /// Per-day, per-queue usage and average wait for the given queues.
    async fn queue_wait(&self, queues: &[&str], days: u32) -> Result<Vec<QueueWait>, FetchError>;

    /// GPU hours per month over the last two years.
    async fn monthly_gpu_hours(&self) -> Result<Vec<MonthlyGpuHours>, FetchError>;
}
