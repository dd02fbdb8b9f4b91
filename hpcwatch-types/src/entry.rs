//! Timestamped payloads as held by the snapshot store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A payload together with the time it was written.
///
/// Entries are replaced wholesale on every successful refresh, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn now(key: impl Into<String>, payload: Value) -> Self {
        Self::with_timestamp(key, Utc::now(), payload)
    }

    /// Create an entry with an explicit timestamp.
    pub fn with_timestamp(key: impl Into<String>, timestamp: DateTime<Utc>, payload: Value) -> Self {
        Self {
            key: key.into(),
            timestamp,
            payload,
        }
    }

    /// How long ago the entry was written, relative to `now`.
    ///
    /// Clamped to zero if the clock went backwards.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn age_is_measured_from_timestamp() {
        let written = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = CacheEntry::with_timestamp("power-status", written, json!({"total": 0}));

        let later = written + Duration::seconds(90);
        assert_eq!(entry.age_at(later), Duration::seconds(90));
        assert_eq!(entry.age_at(written - Duration::seconds(5)), Duration::zero());
    }

    #[test]
    fn empty_payload_is_still_an_entry() {
        let entry = CacheEntry::now("job-stats-1d", json!([]));
        assert_eq!(entry.key, "job-stats-1d");
        assert_eq!(entry.payload, json!([]));
    }
}
