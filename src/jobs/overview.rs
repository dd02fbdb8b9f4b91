//! Cluster overview: node counts, job totals, GPU totals and per-node detail.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use tracing::warn;

use hpcwatch_adapters::{FetchError, MetricsSource};
use hpcwatch_cache::{run_sub_jobs, CacheStore, JobError, JobReport, Pipeline, SubJob};
use hpcwatch_types::report::{ClusterStats, JobSummary, NodeDetail, NodeState, QueueJobs, UserJobs};
use hpcwatch_types::{format_bytes, round1, RowSet, Series};

use super::{count, to_count};

const CLUSTER_STATS_KEY: &str = "cluster-stats";
const JOB_SUMMARY_KEY: &str = "job-summary";
const NODE_DETAILS_KEY: &str = "node-details";
const KEYS: [&str; 3] = [CLUSTER_STATS_KEY, JOB_SUMMARY_KEY, NODE_DETAILS_KEY];

const NODE_COUNT_QUERIES: [&str; 4] = [
    "pbs_node_count_free",
    "pbs_node_count_busy",
    "pbs_node_count_offline",
    "pbs_node_count_down",
];
const JOB_TOTAL_QUERIES: [&str; 3] = [
    "qstat_total_r_jobs",
    "qstat_total_q_jobs",
    "qstat_total_h_jobs",
];
const GPU_TOTAL_QUERIES: [&str; 2] = ["sum(pbs_node_gpus_total)", "sum(pbs_node_gpus_used)"];

const JOBS_BY_USER_QUERY: &str = "qstat_running_jobs_by_user";
const RUNNING_BY_QUEUE_QUERY: &str = "qstat_running_jobs_by_queue";
const QUEUED_BY_QUEUE_QUERY: &str = "qstat_que_by_queue";
const TOP_USERS: usize = 5;

const NODE_STATE_QUERY: &str = "pbs_node_state";
const NODE_GPUS_TOTAL_QUERY: &str = "pbs_node_gpus_total";
const NODE_GPUS_USED_QUERY: &str = "pbs_node_gpus_used";
const NODE_MEM_TOTAL_QUERY: &str = "pbs_node_mem_total";
const NODE_MEM_USED_QUERY: &str = "pbs_node_mem_used";
const NODE_JOBS_QUERY: &str = "pbs_node_jobs";
const NODE_QUERIES: [&str; 5] = [
    NODE_STATE_QUERY,
    NODE_GPUS_TOTAL_QUERY,
    NODE_GPUS_USED_QUERY,
    NODE_MEM_TOTAL_QUERY,
    NODE_MEM_USED_QUERY,
];

/// PBS exporter metrics carry the node in the `node` label; `instance` is
/// the exporter itself.
const NODE_LABEL: &str = "node";

/// Refreshes the three overview keys independently.
pub struct OverviewJob {
    metrics: Arc<dyn MetricsSource>,
}

impl OverviewJob {
    pub fn new(metrics: Arc<dyn MetricsSource>) -> Self {
        Self { metrics }
    }

    fn sub_jobs(&self) -> Vec<SubJob<'_>> {
        vec![
            SubJob::new(CLUSTER_STATS_KEY, self.cluster_stats()),
            SubJob::new(JOB_SUMMARY_KEY, self.job_summary()),
            SubJob::new(NODE_DETAILS_KEY, self.node_details()),
        ]
    }

    /// Run instant queries concurrently, failing on the first error.
    async fn instant_all(&self, queries: &[&str]) -> Result<Vec<RowSet>, FetchError> {
        try_join_all(queries.iter().map(|q| self.metrics.instant(q))).await
    }

    /// Run an instant query whose failure only empties its part of a payload.
    async fn instant_or_empty(&self, query: &str) -> RowSet {
        self.metrics.instant(query).await.unwrap_or_else(|e| {
            warn!(query, cause = %e.cause, error = %e.message, "Optional query failed, using empty result");
            Vec::new()
        })
    }

    async fn cluster_stats(&self) -> Result<ClusterStats, FetchError> {
        let (nodes, jobs, gpus) = futures_util::try_join!(
            self.instant_all(&NODE_COUNT_QUERIES),
            self.instant_all(&JOB_TOTAL_QUERIES),
            self.instant_all(&GPU_TOTAL_QUERIES),
        )?;

        let [free, busy, offline, down] =
            [&nodes[0], &nodes[1], &nodes[2], &nodes[3]].map(|r| count(r));
        let [running, queued, held] = [&jobs[0], &jobs[1], &jobs[2]].map(|r| count(r));
        let [total_gpus, used_gpus] = [&gpus[0], &gpus[1]].map(|r| count(r));

        Ok(ClusterStats {
            total_nodes: free + busy + offline + down,
            busy_nodes: busy,
            free_nodes: free,
            down_nodes: down + offline,
            total_jobs: running + queued + held,
            running_jobs: running,
            queued_jobs: queued,
            held_jobs: held,
            total_gpus,
            used_gpus,
            gpu_utilization: utilization(used_gpus, total_gpus),
        })
    }

    async fn job_summary(&self) -> Result<JobSummary, FetchError> {
        let (totals, users, running, queued) = tokio::join!(
            self.instant_all(&JOB_TOTAL_QUERIES),
            self.instant_or_empty(JOBS_BY_USER_QUERY),
            self.instant_or_empty(RUNNING_BY_QUEUE_QUERY),
            self.instant_or_empty(QUEUED_BY_QUEUE_QUERY),
        );
        let totals = totals?;
        let [running_total, queued_total, held_total] =
            [&totals[0], &totals[1], &totals[2]].map(|r| count(r));

        Ok(JobSummary {
            running: running_total,
            queued: queued_total,
            held: held_total,
            total: running_total + queued_total + held_total,
            top_users: top_users(&users, TOP_USERS),
            queues: merge_queues(&running, &queued),
        })
    }

    async fn node_details(&self) -> Result<Vec<NodeDetail>, FetchError> {
        let (required, jobs) = tokio::join!(
            self.instant_all(&NODE_QUERIES),
            self.metrics.instant(NODE_JOBS_QUERY),
        );
        let required = required?;

        // Not every exporter version publishes per-node job counts
        let job_rows = jobs
            .map_err(|e| {
                warn!(query = NODE_JOBS_QUERY, cause = %e.cause, "Per-node job counts unavailable");
            })
            .ok();
        let jobs = job_rows.as_ref().map(|rows| by_node(rows));

        Ok(node_details(
            &required[0],
            &by_node(&required[1]),
            &by_node(&required[2]),
            &by_node(&required[3]),
            &by_node(&required[4]),
            jobs.as_ref(),
        ))
    }
}

#[async_trait]
impl Pipeline for OverviewJob {
    fn name(&self) -> &str {
        "overview"
    }

    fn keys(&self) -> Vec<String> {
        KEYS.iter().map(|key| key.to_string()).collect()
    }

    async fn run(&self, store: &dyn CacheStore) -> Result<JobReport, JobError> {
        run_sub_jobs(self.name(), store, self.sub_jobs()).await
    }
}

/// `used / total` as a percentage with one decimal, 0 when there is no total.
fn utilization(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round1(used as f64 / total as f64 * 100.0)
    }
}

/// Values keyed by the `node` label. Unparsable values are dropped.
fn by_node(rows: &[Series]) -> HashMap<&str, f64> {
    rows.iter()
        .filter_map(|row| Some((row.get(NODE_LABEL)?, row.value()?)))
        .collect()
}

fn top_users(rows: &[Series], limit: usize) -> Vec<UserJobs> {
    let mut users: Vec<UserJobs> = rows
        .iter()
        .filter_map(|row| {
            Some(UserJobs {
                user: row.get("user")?.to_string(),
                count: to_count(row.value()?),
            })
        })
        .collect();
    users.sort_by(|a, b| b.count.cmp(&a.count));
    users.truncate(limit);
    users
}

/// Merge per-queue running and queued counts, busiest queue first.
fn merge_queues(running: &[Series], queued: &[Series]) -> Vec<QueueJobs> {
    let mut queues: Vec<QueueJobs> = Vec::new();

    for row in running {
        let Some(name) = row.get("queue") else { continue };
        let value = row.value().map(to_count).unwrap_or(0);
        queues.push(QueueJobs {
            queue: name.to_string(),
            running: value,
            queued: 0,
            count: value,
        });
    }

    for row in queued {
        let Some(name) = row.get("queue") else { continue };
        let value = row.value().map(to_count).unwrap_or(0);
        match queues.iter_mut().find(|q| q.queue == name) {
            Some(queue) => {
                queue.queued = value;
                queue.count += value;
            }
            None => queues.push(QueueJobs {
                queue: name.to_string(),
                running: 0,
                queued: value,
                count: value,
            }),
        }
    }

    queues.sort_by(|a, b| b.count.cmp(&a.count));
    queues
}

/// One entry per node present in the state query, sorted by name.
fn node_details(
    states: &[Series],
    gpus_total: &HashMap<&str, f64>,
    gpus_used: &HashMap<&str, f64>,
    mem_total: &HashMap<&str, f64>,
    mem_used: &HashMap<&str, f64>,
    jobs: Option<&HashMap<&str, f64>>,
) -> Vec<NodeDetail> {
    let lookup = |map: &HashMap<&str, f64>, node: &str| map.get(node).copied().unwrap_or(0.0);

    let mut nodes: Vec<NodeDetail> = states
        .iter()
        .filter_map(|row| {
            let node = row.get(NODE_LABEL)?;
            let state = row
                .value()
                .filter(|v| v.fract() == 0.0)
                .map(|v| NodeState::from_code(v as i64))
                .unwrap_or(NodeState::Unknown);
            Some(NodeDetail {
                node: node.to_string(),
                state,
                total_gpus: to_count(lookup(gpus_total, node)),
                used_gpus: to_count(lookup(gpus_used, node)),
                total_memory: format_bytes(lookup(mem_total, node)),
                used_memory: format_bytes(lookup(mem_used, node)),
                jobs: jobs.map(|jobs| to_count(lookup(jobs, node))),
            })
        })
        .collect();

    nodes.sort_by(|a, b| a.node.cmp(&b.node));
    nodes.dedup_by(|a, b| a.node == b.node);
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::fake::FakeMetrics;
    use hpcwatch_cache::MemoryStore;

    fn labelled(label: &str, value: &str, count: &str) -> Series {
        Series::new().label(label, value).point(0.0, count)
    }

    fn healthy() -> FakeMetrics {
        FakeMetrics::new()
            .value("pbs_node_count_free", "10")
            .value("pbs_node_count_busy", "30")
            .value("pbs_node_count_offline", "2")
            .value("pbs_node_count_down", "4")
            .value("qstat_total_r_jobs", "120")
            .value("qstat_total_q_jobs", "35")
            .value("qstat_total_h_jobs", "5")
            .value("sum(pbs_node_gpus_total)", "320")
            .value("sum(pbs_node_gpus_used)", "250")
    }

    #[tokio::test]
    async fn cluster_stats_derive_totals() {
        let job = OverviewJob::new(Arc::new(healthy()));
        let stats = job.cluster_stats().await.unwrap();

        assert_eq!(stats.total_nodes, 46);
        assert_eq!(stats.busy_nodes, 30);
        assert_eq!(stats.free_nodes, 10);
        assert_eq!(stats.down_nodes, 6);
        assert_eq!(stats.total_jobs, 160);
        assert_eq!(stats.held_jobs, 5);
        assert_eq!(stats.total_gpus, 320);
        assert_eq!(stats.used_gpus, 250);
        assert_eq!(stats.gpu_utilization, 78.1);
    }

    #[test]
    fn utilization_without_gpus_is_zero() {
        assert_eq!(utilization(0, 0), 0.0);
        assert_eq!(utilization(1, 4), 25.0);
    }

    #[tokio::test]
    async fn job_summary_ranks_users_and_queues() {
        let metrics = healthy()
            .answer(
                JOBS_BY_USER_QUERY,
                (1..=7)
                    .map(|n| labelled("user", &format!("user{n}"), &n.to_string()))
                    .collect(),
            )
            .answer(
                RUNNING_BY_QUEUE_QUERY,
                vec![labelled("queue", "small", "4"), labelled("queue", "large", "10")],
            )
            .answer(
                QUEUED_BY_QUEUE_QUERY,
                vec![labelled("queue", "small", "9"), labelled("queue", "AISG_debug", "1")],
            );
        let job = OverviewJob::new(Arc::new(metrics));
        let summary = job.job_summary().await.unwrap();

        assert_eq!(summary.total, 160);
        assert_eq!(summary.top_users.len(), 5);
        assert_eq!(summary.top_users[0].user, "user7");
        assert_eq!(summary.top_users[4].user, "user3");

        let queues: Vec<_> = summary
            .queues
            .iter()
            .map(|q| (q.queue.as_str(), q.running, q.queued))
            .collect();
        assert_eq!(queues, vec![("small", 4, 9), ("large", 10, 0), ("AISG_debug", 0, 1)]);
    }

    #[tokio::test]
    async fn failed_queue_query_degrades_to_empty() {
        let metrics = healthy()
            .fail(RUNNING_BY_QUEUE_QUERY, FetchError::rejected("unknown metric"))
            .fail(QUEUED_BY_QUEUE_QUERY, FetchError::unreachable("timeout"));
        let job = OverviewJob::new(Arc::new(metrics));

        let summary = job.job_summary().await.unwrap();
        assert!(summary.queues.is_empty());
        assert_eq!(summary.running, 120);
    }

    #[tokio::test]
    async fn node_details_join_per_node_metrics() {
        let metrics = FakeMetrics::new()
            .answer(
                NODE_STATE_QUERY,
                vec![
                    labelled("node", "hopper-02", "2"),
                    labelled("node", "hopper-01", "1"),
                    labelled("node", "hopper-03", "9"),
                ],
            )
            .answer(NODE_GPUS_TOTAL_QUERY, vec![labelled("node", "hopper-01", "8")])
            .answer(NODE_GPUS_USED_QUERY, vec![labelled("node", "hopper-01", "6")])
            .answer(NODE_MEM_TOTAL_QUERY, vec![labelled("node", "hopper-01", "1073741824")])
            .answer(NODE_MEM_USED_QUERY, vec![labelled("node", "hopper-01", "536870912")])
            .fail(NODE_JOBS_QUERY, FetchError::rejected("unknown metric"));
        let job = OverviewJob::new(Arc::new(metrics));

        let nodes = job.node_details().await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].node, "hopper-01");
        assert_eq!(nodes[0].state, NodeState::Busy);
        assert_eq!(nodes[0].total_gpus, 8);
        assert_eq!(nodes[0].used_gpus, 6);
        assert_eq!(nodes[0].total_memory, "1 GB");
        assert_eq!(nodes[0].used_memory, "512 MB");
        assert_eq!(nodes[0].jobs, None);
        assert_eq!(nodes[1].state, NodeState::Offline);
        assert_eq!(nodes[1].total_memory, "0 B");
        assert_eq!(nodes[2].state, NodeState::Unknown);
    }

    #[tokio::test]
    async fn node_details_include_job_counts_when_published() {
        let metrics = FakeMetrics::new()
            .answer(
                NODE_STATE_QUERY,
                vec![labelled("node", "hopper-01", "1"), labelled("node", "hopper-02", "0")],
            )
            .answer(NODE_JOBS_QUERY, vec![labelled("node", "hopper-01", "3")]);
        let job = OverviewJob::new(Arc::new(metrics));

        let nodes = job.node_details().await.unwrap();
        assert_eq!(nodes[0].jobs, Some(3));
        assert_eq!(nodes[1].jobs, Some(0));
    }

    #[tokio::test]
    async fn one_failing_sub_job_does_not_block_the_others() {
        let metrics = healthy().fail(NODE_STATE_QUERY, FetchError::unreachable("connection refused"));
        let job = OverviewJob::new(Arc::new(metrics));
        let store = MemoryStore::new();

        let err = job.run(&store).await.unwrap_err();
        assert!(matches!(err, JobError::PartialFailure { failed: 1, total: 3 }));

        assert!(store.read(CLUSTER_STATS_KEY).await.unwrap().is_some());
        assert!(store.read(JOB_SUMMARY_KEY).await.unwrap().is_some());
        assert!(store.read(NODE_DETAILS_KEY).await.unwrap().is_none());
    }

    #[test]
    fn keys_match_sub_jobs() {
        let job = OverviewJob::new(Arc::new(FakeMetrics::new()));
        assert_eq!(job.keys(), vec!["cluster-stats", "job-summary", "node-details"]);

        let sub_job_keys: Vec<_> = job.sub_jobs().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(job.keys(), sub_job_keys);
    }
}
