//! Raw rows to per-entity samples.
//!
//! The output always covers the whole universe: entities missing from the
//! rows, and entities whose row could not be parsed, get a placeholder.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use hpcwatch_types::{
    node_name, EntityUniverse, Placeholder, Sample, Series, StatusReading,
};

/// One sample per universe entity, in universe order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<V> {
    pub observed_at: DateTime<Utc>,
    pub samples: Vec<Sample<V>>,
}

impl<V> Batch<V> {
    /// Look up the sample for an entity.
    pub fn get(&self, entity: &str) -> Option<&Sample<V>> {
        self.samples.iter().find(|s| s.entity == entity)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Entity taken from `instance`, `node` or `host`.
pub fn by_instance(series: &Series) -> Option<&str> {
    series.node()
}

/// Entity taken from the `source` label, used by Redfish power series.
pub fn by_source(series: &Series) -> Option<&str> {
    series
        .get("source")
        .map(node_name)
        .filter(|name| !name.is_empty())
}

/// Map rows to samples keyed by entity.
///
/// `entity` names the entity a row belongs to; `parse` turns the row into a
/// value, returning `None` if the row is malformed. Rows for entities outside
/// the universe are ignored. If an entity has several rows the first wins.
pub fn transform<V, P>(
    rows: &[Series],
    universe: &EntityUniverse,
    observed_at: DateTime<Utc>,
    entity: fn(&Series) -> Option<&str>,
    parse: P,
) -> Batch<V>
where
    V: Placeholder,
    P: Fn(&Series) -> Option<V>,
{
    let mut by_entity: HashMap<&str, &Series> = HashMap::new();
    for row in rows {
        match entity(row) {
            Some(name) if universe.contains(name) => {
                by_entity.entry(name).or_insert(row);
            }
            Some(name) => debug!(entity = name, "Ignoring row outside the universe"),
            None => debug!(labels = ?row.labels, "Ignoring row without an entity label"),
        }
    }

    let samples = universe
        .iter()
        .map(|name| {
            let value = match by_entity.get(name) {
                Some(row) => parse(row).unwrap_or_else(|| {
                    warn!(entity = name, points = ?row.points, "Malformed row, using placeholder");
                    V::placeholder()
                }),
                None => V::placeholder(),
            };
            Sample::new(name, observed_at, value)
        })
        .collect();

    Batch {
        observed_at,
        samples,
    }
}

/// Parse a status code: an integral number.
fn parse_code(series: &Series) -> Option<i64> {
    let value = series.value()?;
    (value.fract() == 0.0).then_some(value as i64)
}

/// Highest per-node draw accepted as a real reading.
pub const MAX_NODE_WATTS: f64 = 100_000.0;

/// Parse a wattage: a number in `0..=MAX_NODE_WATTS`, truncated to whole
/// watts.
pub fn parse_watts(series: &Series) -> Option<u64> {
    let value = series.value()?;
    (0.0..=MAX_NODE_WATTS).contains(&value).then_some(value as u64)
}

/// Build health samples from `globalSystemStatus` and `systemPowerUpTime`
/// rows.
///
/// Uptime is attached to the status sample of the same entity. A missing or
/// non-positive uptime becomes 0 and leaves the last known uptime in charge.
pub fn transform_status(
    status_rows: &[Series],
    uptime_rows: &[Series],
    universe: &EntityUniverse,
    observed_at: DateTime<Utc>,
) -> Batch<StatusReading> {
    let mut uptimes: HashMap<&str, u64> = HashMap::new();
    for row in uptime_rows {
        if let (Some(node), Some(secs)) = (row.node(), row.value().filter(|v| *v > 0.0)) {
            uptimes.entry(node).or_insert(secs as u64);
        }
    }

    let mut batch = transform(status_rows, universe, observed_at, by_instance, |row| {
        parse_code(row).map(|code| StatusReading::from_code(code, 0))
    });

    for sample in &mut batch.samples {
        if let Some(secs) = uptimes.get(sample.entity.as_str()) {
            sample.value.uptime_secs = *secs;
        }
    }

    batch
}

/// Build power samples from `redfish_power_powercontrol_power_consumed_watts`
/// rows.
pub fn transform_power(
    rows: &[Series],
    universe: &EntityUniverse,
    observed_at: DateTime<Utc>,
) -> Batch<u64> {
    transform(rows, universe, observed_at, by_source, parse_watts)
}
