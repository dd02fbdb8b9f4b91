//! Payload records written under each cache key.
//!
//! Field names are camelCase on the wire because the dashboard front end
//! consumes these records unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HealthStatus;

// Hardware health

/// Merged health of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub node: String,
    pub status: HealthStatus,
    pub status_label: String,
    pub status_value: i64,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
}

/// Count of nodes per merged status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub non_recoverable: usize,
    pub other: usize,
    pub unknown: usize,
    pub total: usize,
}

impl HealthSummary {
    pub fn tally(nodes: &[NodeHealth]) -> Self {
        let mut summary = Self {
            total: nodes.len(),
            ..Self::default()
        };
        for node in nodes {
            match node.status {
                HealthStatus::Ok => summary.ok += 1,
                HealthStatus::Warning => summary.warning += 1,
                HealthStatus::Critical => summary.critical += 1,
                HealthStatus::NonRecoverable => summary.non_recoverable += 1,
                HealthStatus::Other => summary.other += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareReport {
    pub nodes: Vec<NodeHealth>,
    pub summary: HealthSummary,
    /// Observation time of the newest ingested batch.
    pub timestamp: DateTime<Utc>,
}

// Power

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePower {
    pub node: String,
    pub watts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    pub nodes: Vec<NodePower>,
    pub total: u64,
    /// Observation time of the newest ingested batch.
    pub timestamp: DateTime<Utc>,
}

// Cluster overview

/// Cluster-wide node, job and GPU totals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub total_nodes: u64,
    pub busy_nodes: u64,
    pub free_nodes: u64,
    /// Down and offline nodes together.
    pub down_nodes: u64,
    pub total_jobs: u64,
    pub running_jobs: u64,
    pub queued_jobs: u64,
    pub held_jobs: u64,
    pub total_gpus: u64,
    pub used_gpus: u64,
    pub gpu_utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJobs {
    pub user: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueJobs {
    pub queue: String,
    pub running: u64,
    pub queued: u64,
    /// Running plus queued.
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub running: u64,
    pub queued: u64,
    pub held: u64,
    pub total: u64,
    pub top_users: Vec<UserJobs>,
    pub queues: Vec<QueueJobs>,
}

/// Scheduler state of a node as reported by `pbs_node_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Free,
    Busy,
    Offline,
    Down,
    Unknown,
}

impl NodeState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => NodeState::Free,
            1 => NodeState::Busy,
            2 => NodeState::Offline,
            3 => NodeState::Down,
            _ => NodeState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub node: String,
    pub state: NodeState,
    pub total_gpus: u64,
    pub used_gpus: u64,
    pub total_memory: String,
    pub used_memory: String,
    /// Running job count, absent when the exporter does not publish it.
    pub jobs: Option<u64>,
}

// Analytics time series

/// A time series over one symbolic range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline<P> {
    pub range: String,
    pub step: String,
    pub points: Vec<P>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPoint {
    pub timestamp: i64,
    pub running_jobs: u64,
    pub queued_jobs: u64,
    pub total_jobs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoint {
    pub timestamp: i64,
    pub gpu_utilization: f64,
    pub memory_utilization: f64,
    pub node_utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupationPoint {
    pub timestamp: i64,
    pub overall: f64,
    pub aisg: f64,
    pub non_aisg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPoint {
    pub timestamp: i64,
    pub watts: u64,
}

// Warehouse reports

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGpuHours {
    pub username: String,
    pub num_jobs: u64,
    pub total_gpus_used: u64,
    pub avg_gpus_per_job: f64,
    pub total_gpu_hours: f64,
    pub avg_gpu_hours_per_job: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyJobStats {
    /// `YYYY-MM-DD`.
    pub job_date: String,
    pub num_jobs: u64,
    pub total_gpu_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueWait {
    pub date: String,
    pub queue_name: String,
    pub num_jobs: u64,
    pub total_gpu_hours: f64,
    pub avg_gpu_hours_per_job: f64,
    pub avg_wait_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyGpuHours {
    /// Display label such as `Mar 2024`.
    pub month: String,
    pub gpu_hours: f64,
}
