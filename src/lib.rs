//! # hpcwatch
//!
//! A telemetry aggregation cache for HPC cluster dashboards.
//!
//! hpcwatch polls a Prometheus-compatible metrics backend and an XDMoD
//! warehouse on fixed intervals, turns the results into per-key JSON
//! snapshots and keeps them in a cache directory. Dashboards read the
//! snapshots; they never wait on, or see a failure from, a slow backend.
//!
//! ## Jobs
//!
//! | Job | Default interval | Keys |
//! |---|---|---|
//! | `hardware` | 3 min | `hardware-status` |
//! | `power` | 3 min | `power-status` |
//! | `overview` | 1 min | `cluster-stats`, `job-summary`, `node-details` |
//! | `analytics` | 5 min | `job-analytics-*`, `resource-analytics-*`, `gpu-occupation-*`, `power-history-*` |
//! | `aggregate` | 1 h | warehouse reports (only with a warehouse URL) |
//!
//! Hardware health and power are flap damped: each node keeps a short window
//! of recent readings and the displayed value is derived from the whole
//! window, so a single missed scrape does not blank a node.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hpcwatch::config::Settings;
//! use hpcwatch::{build_scheduler, SnapshotReader};
//! use hpcwatch_cache::{CacheStore, FileStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let store: Arc<dyn CacheStore> = Arc::new(FileStore::new(&settings.cache.dir));
//!
//! let scheduler = build_scheduler(&settings, store.clone())?;
//! let handle = scheduler.start();
//!
//! let reader = SnapshotReader::new(store);
//! match reader.read("cluster-stats").await {
//!     Ok(snapshot) => println!("{} ({}s old)", snapshot.data, snapshot.age),
//!     Err(e) => println!("{e}"),
//! }
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::info;

use hpcwatch_adapters::metrics::MetricsAdapter;
use hpcwatch_adapters::warehouse::WarehouseAdapter;
use hpcwatch_adapters::{FetchError, MetricsSource};
use hpcwatch_cache::{CacheStore, Scheduler};

pub mod config;
pub mod jobs;
pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotError, SnapshotReader};

use config::{MetricsSettings, Settings, WarehouseSettings};
use jobs::{AggregateJob, AnalyticsJob, HardwareJob, OverviewJob, PowerJob};

/// Build the metrics adapter described by `settings`.
pub fn metrics_adapter(settings: &MetricsSettings) -> Result<MetricsAdapter, FetchError> {
    let mut builder = MetricsAdapter::builder()
        .endpoint(&settings.url)
        .timeout(settings.timeout());

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        builder = builder.credentials(username, password);
    }
    if let Some(token) = &settings.token {
        builder = builder.token(token);
    }

    builder.build()
}

/// Build the warehouse adapter, or `None` when no warehouse is configured.
pub fn warehouse_adapter(
    settings: &WarehouseSettings,
) -> Result<Option<WarehouseAdapter>, FetchError> {
    let Some(url) = &settings.url else {
        return Ok(None);
    };

    WarehouseAdapter::builder()
        .url(url)
        .schema(&settings.schema)
        .max_connections(settings.max_connections)
        .timeout(settings.timeout())
        .build()
        .map(Some)
}

/// Register every refresh job on a scheduler writing to `store`.
pub fn build_scheduler(
    settings: &Settings,
    store: Arc<dyn CacheStore>,
) -> Result<Scheduler, FetchError> {
    let metrics: Arc<dyn MetricsSource> = Arc::new(metrics_adapter(&settings.metrics)?);
    let universe = settings.cluster.universe();
    let schedule = &settings.schedule;

    let mut builder = Scheduler::builder(store)
        .job(
            Arc::new(HardwareJob::new(
                metrics.clone(),
                universe.clone(),
                settings.cluster.status_depth,
            )),
            schedule.hardware(),
        )
        .job(
            Arc::new(PowerJob::new(
                metrics.clone(),
                universe.clone(),
                settings.cluster.power_depth,
            )),
            schedule.power(),
        )
        .job(Arc::new(OverviewJob::new(metrics.clone())), schedule.overview())
        .job(
            Arc::new(AnalyticsJob::new(metrics, &universe)),
            schedule.analytics(),
        );

    match warehouse_adapter(&settings.warehouse)? {
        Some(warehouse) => {
            builder = builder.job(
                Arc::new(AggregateJob::new(Arc::new(warehouse))),
                schedule.aggregate(),
            );
        }
        None => info!("No warehouse configured, aggregate reports disabled"),
    }

    Ok(builder.build())
}
