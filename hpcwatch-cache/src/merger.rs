//! Per-entity history for flap-prone signals.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use hpcwatch_types::report::{HardwareReport, HealthSummary, NodeHealth, NodePower, PowerReport};
use hpcwatch_types::{format_uptime, EntityUniverse, Placeholder, StatusReading};

use crate::history::{HistoryWindow, Mergeable};
use crate::transform::Batch;

/// Label shown for entities without any usable reading.
pub const NO_DATA_LABEL: &str = "No Data";

/// One history window per universe entity.
#[derive(Debug)]
pub struct HistoryMerger<V> {
    universe: EntityUniverse,
    windows: HashMap<String, HistoryWindow<V>>,
    depth: usize,
    latest: Option<DateTime<Utc>>,
}

impl<V: Mergeable> HistoryMerger<V> {
    pub fn new(universe: EntityUniverse, depth: usize) -> Self {
        let windows = universe
            .iter()
            .map(|name| (name.to_string(), HistoryWindow::new(depth)))
            .collect();
        Self {
            universe,
            windows,
            depth,
            latest: None,
        }
    }

    /// Push every sample of a batch into its entity's window.
    pub fn ingest(&mut self, batch: Batch<V>) {
        self.latest = Some(match self.latest {
            Some(prev) => prev.max(batch.observed_at),
            None => batch.observed_at,
        });

        for sample in batch.samples {
            let depth = self.depth;
            self.windows
                .entry(sample.entity.clone())
                .or_insert_with(|| HistoryWindow::new(depth))
                .push(sample);
        }
    }

    /// Merged value for every entity, in universe order.
    pub fn merged(&self) -> Vec<(&str, V)> {
        self.universe
            .iter()
            .map(|name| {
                let value = self
                    .windows
                    .get(name)
                    .map(HistoryWindow::merge)
                    .unwrap_or_else(V::placeholder);
                (name, value)
            })
            .collect()
    }

    pub fn window(&self, entity: &str) -> Option<&HistoryWindow<V>> {
        self.windows.get(entity)
    }

    /// Observation time of the newest ingested batch.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.latest
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Last positive uptime seen per entity.
///
/// Only a fresh positive reading replaces a stored value, so a missed scrape
/// never turns a known uptime back into zero.
#[derive(Debug, Default, Clone)]
pub struct LastKnownUptime {
    uptimes: HashMap<String, u64>,
}

impl LastKnownUptime {
    pub fn observe(&mut self, entity: &str, secs: u64) {
        if secs > 0 {
            self.uptimes.insert(entity.to_string(), secs);
        }
    }

    /// Stored uptime, or 0 if none was ever observed.
    pub fn get(&self, entity: &str) -> u64 {
        self.uptimes.get(entity).copied().unwrap_or(0)
    }
}

/// History merger for hardware health.
#[derive(Debug)]
pub struct StatusMerger {
    history: HistoryMerger<StatusReading>,
    uptimes: LastKnownUptime,
}

impl StatusMerger {
    pub fn new(universe: EntityUniverse, depth: usize) -> Self {
        Self {
            history: HistoryMerger::new(universe, depth),
            uptimes: LastKnownUptime::default(),
        }
    }

    pub fn ingest(&mut self, batch: Batch<StatusReading>) {
        for sample in &batch.samples {
            self.uptimes.observe(&sample.entity, sample.value.uptime_secs);
        }
        debug!(entities = batch.len(), "Ingesting health batch");
        self.history.ingest(batch);
    }

    pub fn uptimes(&self) -> &LastKnownUptime {
        &self.uptimes
    }

    pub fn history(&self) -> &HistoryMerger<StatusReading> {
        &self.history
    }

    /// Build the hardware payload, or `None` before the first ingest.
    pub fn report(&self) -> Option<HardwareReport> {
        let timestamp = self.history.latest()?;

        let nodes: Vec<NodeHealth> = self
            .history
            .merged()
            .into_iter()
            .map(|(node, reading)| {
                let uptime = self.uptimes.get(node);
                let label = if reading.is_placeholder() {
                    NO_DATA_LABEL
                } else {
                    reading.status.label()
                };
                NodeHealth {
                    node: node.to_string(),
                    status: reading.status,
                    status_label: label.to_string(),
                    status_value: reading.code,
                    uptime_seconds: uptime,
                    uptime_formatted: format_uptime(uptime),
                }
            })
            .collect();

        Some(HardwareReport {
            summary: HealthSummary::tally(&nodes),
            nodes,
            timestamp,
        })
    }
}

/// History merger for power draw.
#[derive(Debug)]
pub struct PowerMerger {
    history: HistoryMerger<u64>,
}

impl PowerMerger {
    pub fn new(universe: EntityUniverse, depth: usize) -> Self {
        Self {
            history: HistoryMerger::new(universe, depth),
        }
    }

    pub fn ingest(&mut self, batch: Batch<u64>) {
        debug!(entities = batch.len(), "Ingesting power batch");
        self.history.ingest(batch);
    }

    pub fn history(&self) -> &HistoryMerger<u64> {
        &self.history
    }

    /// Build the power payload, or `None` before the first ingest.
    pub fn report(&self) -> Option<PowerReport> {
        let timestamp = self.history.latest()?;

        let nodes: Vec<NodePower> = self
            .history
            .merged()
            .into_iter()
            .map(|(node, watts)| NodePower {
                node: node.to_string(),
                watts,
            })
            .collect();

        Some(PowerReport {
            total: nodes.iter().map(|n| n.watts).fold(0u64, u64::saturating_add),
            nodes,
            timestamp,
        })
    }
}
