//! Historical analytics over the symbolic time ranges.
//!
//! Each `(series, range)` pair is its own sub-job and key. Multi-query
//! series are merged on the timestamps of their first query; a timestamp
//! missing from a secondary query reads as zero there.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use hpcwatch_adapters::{FetchError, MetricsSource};
use hpcwatch_cache::{run_sub_jobs, CacheStore, JobError, JobReport, Pipeline, SubJob};
use hpcwatch_types::report::{JobPoint, OccupationPoint, PowerPoint, ResourcePoint, Timeline};
use hpcwatch_types::{round1, EntityUniverse, PowerRange, RangeSpec, RowSet, Series, TimeRange};

use super::to_count;

const RUNNING_JOBS_QUERY: &str = "qstat_total_r_jobs";
const QUEUED_JOBS_QUERY: &str = "qstat_total_q_jobs";

const GPU_UTIL_QUERY: &str = "(sum(pbs_node_gpus_used) / sum(pbs_node_gpus_total)) * 100";
const MEM_UTIL_QUERY: &str = "(sum(pbs_node_mem_used) / sum(pbs_node_mem_total)) * 100";
const NODE_UTIL_QUERY: &str =
    "(pbs_node_count_busy / (pbs_node_count_free + pbs_node_count_busy)) * 100";

const POWER_TOTAL_QUERY: &str = "sum(redfish_power_powercontrol_power_consumed_watts)";

/// Login and service nodes, left out of the overall occupation rate.
const SERVICE_NODES: RangeInclusive<usize> = 1..=6;
/// Nodes dedicated to the AISG allocation.
const AISG_NODES: RangeInclusive<usize> = 31..=46;
/// Shared compute nodes.
const SHARED_NODES: RangeInclusive<usize> = 7..=30;

/// GPU occupation is not tracked over the hourly range.
const OCCUPATION_RANGES: [TimeRange; 3] = [TimeRange::Day, TimeRange::Week, TimeRange::Month];

const JOB_PREFIX: &str = "job-analytics";
const RESOURCE_PREFIX: &str = "resource-analytics";
const OCCUPATION_PREFIX: &str = "gpu-occupation";
const POWER_PREFIX: &str = "power-history";

fn range_key(prefix: &str, range: impl std::fmt::Display) -> String {
    format!("{prefix}-{range}")
}

/// Every key written, in sub-job order.
fn analytics_keys() -> Vec<String> {
    let mut keys = Vec::new();
    for range in TimeRange::ALL {
        keys.push(range_key(JOB_PREFIX, range));
        keys.push(range_key(RESOURCE_PREFIX, range));
    }
    keys.extend(OCCUPATION_RANGES.map(|range| range_key(OCCUPATION_PREFIX, range)));
    keys.extend(PowerRange::ALL.map(|range| range_key(POWER_PREFIX, range)));
    keys
}

/// Refreshes every analytics time series.
pub struct AnalyticsJob {
    metrics: Arc<dyn MetricsSource>,
    occupation: OccupationQueries,
}

impl AnalyticsJob {
    pub fn new(metrics: Arc<dyn MetricsSource>, universe: &EntityUniverse) -> Self {
        Self {
            metrics,
            occupation: OccupationQueries::new(universe),
        }
    }

    fn sub_jobs(&self) -> Vec<SubJob<'_>> {
        let mut sub_jobs = Vec::new();

        for range in TimeRange::ALL {
            sub_jobs.push(SubJob::new(
                range_key(JOB_PREFIX, range),
                self.job_timeline(range),
            ));
            sub_jobs.push(SubJob::new(
                range_key(RESOURCE_PREFIX, range),
                self.resource_timeline(range),
            ));
        }
        for range in OCCUPATION_RANGES {
            sub_jobs.push(SubJob::new(
                range_key(OCCUPATION_PREFIX, range),
                self.occupation_timeline(range),
            ));
        }
        for range in PowerRange::ALL {
            sub_jobs.push(SubJob::new(
                range_key(POWER_PREFIX, range),
                self.power_timeline(range),
            ));
        }

        sub_jobs
    }

    /// Run range queries over one window concurrently.
    async fn range_all<const N: usize>(
        &self,
        queries: [&str; N],
        spec: RangeSpec,
    ) -> Result<[RowSet; N], FetchError> {
        let window = spec.window_at(Utc::now());
        let rows = futures_util::future::try_join_all(
            queries.iter().map(|q| self.metrics.range(q, &window)),
        )
        .await?;
        rows.try_into()
            .map_err(|_| FetchError::malformed("range query result count mismatch"))
    }

    async fn job_timeline(&self, range: TimeRange) -> Result<Timeline<JobPoint>, FetchError> {
        let spec = range.spec();
        let [running, queued] = self
            .range_all([RUNNING_JOBS_QUERY, QUEUED_JOBS_QUERY], spec)
            .await?;

        let queued = by_timestamp(&queued);
        let points = points(&running)
            .into_iter()
            .map(|(timestamp, running)| {
                let running_jobs = to_count(running);
                let queued_jobs = to_count(queued.get(&timestamp).copied().unwrap_or(0.0));
                JobPoint {
                    timestamp,
                    running_jobs,
                    queued_jobs,
                    total_jobs: running_jobs + queued_jobs,
                }
            })
            .collect();

        Ok(timeline(range.symbol(), spec, points))
    }

    async fn resource_timeline(
        &self,
        range: TimeRange,
    ) -> Result<Timeline<ResourcePoint>, FetchError> {
        let spec = range.spec();
        let [gpu, memory, node] = self
            .range_all([GPU_UTIL_QUERY, MEM_UTIL_QUERY, NODE_UTIL_QUERY], spec)
            .await?;

        let memory = by_timestamp(&memory);
        let node = by_timestamp(&node);
        let points = points(&gpu)
            .into_iter()
            .map(|(timestamp, gpu)| ResourcePoint {
                timestamp,
                gpu_utilization: round1(gpu),
                memory_utilization: round1(at(&memory, timestamp)),
                node_utilization: round1(at(&node, timestamp)),
            })
            .collect();

        Ok(timeline(range.symbol(), spec, points))
    }

    async fn occupation_timeline(
        &self,
        range: TimeRange,
    ) -> Result<Timeline<OccupationPoint>, FetchError> {
        let spec = range.spec();
        let queries = [
            self.occupation.overall.as_str(),
            self.occupation.aisg.as_str(),
            self.occupation.shared.as_str(),
        ];
        let [overall, aisg, shared] = self.range_all(queries, spec).await?;

        let aisg = by_timestamp(&aisg);
        let shared = by_timestamp(&shared);
        let points = points(&overall)
            .into_iter()
            .map(|(timestamp, overall)| OccupationPoint {
                timestamp,
                overall: round1(overall),
                aisg: round1(at(&aisg, timestamp)),
                non_aisg: round1(at(&shared, timestamp)),
            })
            .collect();

        Ok(timeline(range.symbol(), spec, points))
    }

    async fn power_timeline(&self, range: PowerRange) -> Result<Timeline<PowerPoint>, FetchError> {
        let spec = range.spec();
        let [total] = self.range_all([POWER_TOTAL_QUERY], spec).await?;

        let points = points(&total)
            .into_iter()
            .map(|(timestamp, watts)| PowerPoint {
                timestamp,
                watts: to_count(watts.round()),
            })
            .collect();

        Ok(timeline(range.symbol(), spec, points))
    }
}

#[async_trait]
impl Pipeline for AnalyticsJob {
    fn name(&self) -> &str {
        "analytics"
    }

    fn keys(&self) -> Vec<String> {
        analytics_keys()
    }

    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError> {
        run_sub_jobs(self.name(), store, self.sub_jobs()).await
    }
}

/// GPU occupation queries for the node groups, built once from the universe.
#[derive(Debug, Clone)]
struct OccupationQueries {
    overall: String,
    aisg: String,
    shared: String,
}

impl OccupationQueries {
    fn new(universe: &EntityUniverse) -> Self {
        Self {
            overall: occupation_query("!~", &universe.group(SERVICE_NODES)),
            aisg: occupation_query("=~", &universe.group(AISG_NODES)),
            shared: occupation_query("=~", &universe.group(SHARED_NODES)),
        }
    }
}

/// `used / total * 100` over the nodes matched (or excluded) by `nodes`.
fn occupation_query(op: &str, nodes: &[&str]) -> String {
    let selector = format!("{{node{op}\"{}\"}}", nodes.join("|"));
    format!(
        "(sum(pbs_node_gpus_used{selector}) / sum(pbs_node_gpus_total{selector})) * 100"
    )
}

/// Points of the first series as `(unix seconds, value)`, skipping values
/// that do not parse.
fn points(rows: &[Series]) -> Vec<(i64, f64)> {
    rows.first()
        .map(|series| {
            series
                .points
                .iter()
                .filter_map(|p| Some((p.timestamp as i64, p.parse()?)))
                .collect()
        })
        .unwrap_or_default()
}

fn by_timestamp(rows: &[Series]) -> HashMap<i64, f64> {
    points(rows).into_iter().collect()
}

fn at(values: &HashMap<i64, f64>, timestamp: i64) -> f64 {
    values.get(&timestamp).copied().unwrap_or(0.0)
}

fn timeline<P>(range: &str, spec: RangeSpec, points: Vec<P>) -> Timeline<P> {
    Timeline {
        range: range.to_string(),
        step: spec.step.to_string(),
        points,
    }
}
