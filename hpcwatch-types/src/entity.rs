//! The fixed universe of monitored nodes.

use std::ops::RangeInclusive;

/// The fixed, ordered set of monitored entities.
///
/// Every payload enumerates the full universe in this order, whether or not
/// an entity reported data in the latest fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUniverse {
    names: Vec<String>,
}

impl EntityUniverse {
    /// Build a universe from explicit names, keeping their order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Build `{prefix}{n}` for `n` in `1..=count`, zero padded to `width`.
    ///
    /// `numbered("hopper-", 46, 2)` yields `hopper-01` … `hopper-46`.
    pub fn numbered(prefix: &str, count: usize, width: usize) -> Self {
        Self {
            names: (1..=count).map(|n| numbered_name(prefix, n, width)).collect(),
        }
    }

    /// All entity names in display order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate over entity names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the universe is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if an entity belongs to the universe.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Names at the given 1-based positions (e.g. nodes 31 to 46).
    pub fn group(&self, positions: RangeInclusive<usize>) -> Vec<&str> {
        positions
            .filter_map(|pos| pos.checked_sub(1))
            .filter_map(|idx| self.names.get(idx))
            .map(String::as_str)
            .collect()
    }
}

fn numbered_name(prefix: &str, n: usize, width: usize) -> String {
    format!("{prefix}{n:0width$}")
}

/// Reduce an exporter `instance` label to a bare node name.
///
/// Strips the port and any domain suffix:
/// `hopper-07.cluster.local:9100` becomes `hopper-07`.
pub fn node_name(instance: &str) -> &str {
    let host = instance.split(':').next().unwrap_or(instance);
    host.split('.').next().unwrap_or(host)
}
