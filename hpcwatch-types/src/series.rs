//! Canonical row set returned by metrics queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::node_name;

/// Labels that may carry the node identity, in lookup order.
const NODE_LABELS: [&str; 3] = ["instance", "node", "host"];

/// One `(timestamp, value)` pair.
///
/// Values stay in the textual form the backend sends them in; parsing is
/// left to the transformer so a bad value only affects its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    pub value: String,
}

impl Point {
    pub fn new(timestamp: f64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Parse the value as a finite number.
    pub fn parse(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// A labelled series. Instant queries produce one point per series, range
/// queries produce many.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub points: Vec<Point>,
}

/// The result of one metrics query.
pub type RowSet = Vec<Series>;

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label.
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Add a point.
    pub fn point(mut self, timestamp: f64, value: impl Into<String>) -> Self {
        self.points.push(Point::new(timestamp, value));
        self
    }

    /// Look up a label value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Node name taken from `instance`, `node` or `host`, with any port and
    /// domain removed.
    pub fn node(&self) -> Option<&str> {
        NODE_LABELS
            .iter()
            .find_map(|label| self.get(label))
            .map(node_name)
            .filter(|name| !name.is_empty())
    }

    /// The last point's value, parsed. For instant queries this is the value.
    pub fn value(&self) -> Option<f64> {
        self.points.last().and_then(Point::parse)
    }
}

/// Value of the first series, for queries that return a single scalar
/// (e.g. `sum(...)`).
pub fn scalar(rows: &[Series]) -> Option<f64> {
    rows.first().and_then(Series::value)
}
