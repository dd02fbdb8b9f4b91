//! Per-entity observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{HealthStatus, NO_DATA_CODE};

/// One observation for one entity at one refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample<V> {
    /// Entity (node) name.
    pub entity: String,
    /// When the batch containing this sample was fetched.
    pub observed_at: DateTime<Utc>,
    /// Source-specific reading.
    pub value: V,
}

impl<V> Sample<V> {
    /// Create a sample.
    pub fn new(entity: impl Into<String>, observed_at: DateTime<Utc>, value: V) -> Self {
        Self {
            entity: entity.into(),
            observed_at,
            value,
        }
    }
}

impl<V: Placeholder> Sample<V> {
    /// Create the placeholder sample for an entity that produced no reading.
    pub fn placeholder(entity: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self::new(entity, observed_at, V::placeholder())
    }
}

/// Values that have an explicit "no reading" form.
///
/// The transformer emits placeholders for every entity of the universe that
/// is missing from a fetch, so consumers always see the full key set.
pub trait Placeholder {
    /// The reserved "unknown" / zero value.
    fn placeholder() -> Self;

    /// Returns true if this value is the placeholder.
    fn is_placeholder(&self) -> bool;
}

/// A health reading: status, the raw status code and the uptime scraped
/// alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReading {
    pub status: HealthStatus,
    /// Raw `globalSystemStatus` code, or [`NO_DATA_CODE`].
    pub code: i64,
    /// Uptime in seconds, 0 when the scrape returned nothing.
    pub uptime_secs: u64,
}

impl StatusReading {
    /// Build a reading from a raw status code.
    pub fn from_code(code: i64, uptime_secs: u64) -> Self {
        Self {
            status: HealthStatus::from_code(code),
            code,
            uptime_secs,
        }
    }
}

impl Placeholder for StatusReading {
    fn placeholder() -> Self {
        Self {
            status: HealthStatus::Unknown,
            code: NO_DATA_CODE,
            uptime_secs: 0,
        }
    }

    fn is_placeholder(&self) -> bool {
        self.code == NO_DATA_CODE
    }
}

/// Power draw in watts.
impl Placeholder for u64 {
    fn placeholder() -> Self {
        0
    }

    fn is_placeholder(&self) -> bool {
        *self == 0
    }
}

/// Sample carrying a health reading.
pub type StatusSample = Sample<StatusReading>;

/// Sample carrying a wattage.
pub type PowerSample = Sample<u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_placeholder_is_unknown_with_no_data_code() {
        let sample = StatusSample::placeholder("hopper-01", Utc::now());
        assert_eq!(sample.entity, "hopper-01");
        assert_eq!(sample.value.status, HealthStatus::Unknown);
        assert_eq!(sample.value.code, NO_DATA_CODE);
        assert_eq!(sample.value.uptime_secs, 0);
        assert!(sample.value.is_placeholder());
    }

    #[test]
    fn reported_unknown_is_not_a_placeholder() {
        // Code 2 is a real "unknown" reading from the controller
        let reading = StatusReading::from_code(2, 120);
        assert_eq!(reading.status, HealthStatus::Unknown);
        assert!(!reading.is_placeholder());
    }

    #[test]
    fn power_placeholder_is_zero() {
        let sample = PowerSample::placeholder("hopper-02", Utc::now());
        assert_eq!(sample.value, 0);
        assert!(sample.value.is_placeholder());
    }
}
