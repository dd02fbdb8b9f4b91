//! Per-node power draw refresh.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use hpcwatch_adapters::MetricsSource;
use hpcwatch_cache::{transform_power, CacheStore, JobError, JobReport, Pipeline, PowerMerger};
use hpcwatch_types::EntityUniverse;

use super::write_payload;

pub const POWER_KEY: &str = "power-status";

const POWER_QUERY: &str = "redfish_power_powercontrol_power_consumed_watts";

/// Polls Redfish power readings. A node that misses a scrape keeps showing
/// its last nonzero reading while it is still inside the window.
pub struct PowerJob {
    metrics: Arc<dyn MetricsSource>,
    universe: EntityUniverse,
    merger: Mutex<PowerMerger>,
}

impl PowerJob {
    pub fn new(metrics: Arc<dyn MetricsSource>, universe: EntityUniverse, depth: usize) -> Self {
        Self {
            merger: Mutex::new(PowerMerger::new(universe.clone(), depth)),
            metrics,
            universe,
        }
    }
}

#[async_trait]
impl Pipeline for PowerJob {
    fn name(&self) -> &str {
        "power"
    }

    fn keys(&self) -> Vec<String> {
        vec![POWER_KEY.to_string()]
    }

    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError> {
        let rows = self.metrics.instant(POWER_QUERY).await?;

        let batch = transform_power(&rows, &self.universe, Utc::now());
        let report = {
            let mut merger = self.merger.lock();
            merger.ingest(batch);
            merger.report()
        };

        match report {
            Some(report) => write_payload(store, POWER_KEY, &report).await,
            None => Ok(JobReport::default()),
        }
    }
}
