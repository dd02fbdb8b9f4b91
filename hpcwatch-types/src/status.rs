//! Hardware health status and its severity order.

use serde::{Deserialize, Serialize};

/// Health status reported by a node's management controller.
///
/// Statuses other than [`HealthStatus::Unknown`] carry a severity. When
/// several recent readings disagree, the one with the highest severity wins:
///
/// `Critical > NonRecoverable > Warning > Other > Ok`
///
/// `Unknown` has no severity at all; it means "no usable reading" and is
/// skipped by the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Ok,
    Other,
    Warning,
    NonRecoverable,
    Critical,
    Unknown,
}

/// Status code used for entities that produced no reading.
pub const NO_DATA_CODE: i64 = -1;

impl HealthStatus {
    /// Map a `globalSystemStatus` code to a status.
    ///
    /// Codes: 1 other, 2 unknown, 3 ok, 4 warning, 5 critical,
    /// 6 non-recoverable. Anything else maps to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => HealthStatus::Other,
            3 => HealthStatus::Ok,
            4 => HealthStatus::Warning,
            5 => HealthStatus::Critical,
            6 => HealthStatus::NonRecoverable,
            _ => HealthStatus::Unknown,
        }
    }

    /// Rank in the severity order, or `None` for `Unknown`.
    pub fn severity(&self) -> Option<u8> {
        match self {
            HealthStatus::Ok => Some(0),
            HealthStatus::Other => Some(1),
            HealthStatus::Warning => Some(2),
            HealthStatus::NonRecoverable => Some(3),
            HealthStatus::Critical => Some(4),
            HealthStatus::Unknown => None,
        }
    }

    /// Returns true if `self` is strictly more severe than `other`.
    ///
    /// A known status always outranks `Unknown`.
    pub fn outranks(&self, other: HealthStatus) -> bool {
        self.severity() > other.severity()
    }

    /// Returns true for every status except `Unknown`.
    pub fn is_known(&self) -> bool {
        self.severity().is_some()
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Other => "Other",
            HealthStatus::Warning => "Warning",
            HealthStatus::NonRecoverable => "Non-Recoverable",
            HealthStatus::Critical => "Critical",
            HealthStatus::Unknown => "Unknown",
        }
    }

    /// Wire name, as used in cached payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Other => "other",
            HealthStatus::Warning => "warning",
            HealthStatus::NonRecoverable => "non-recoverable",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(HealthStatus::from_code(1), HealthStatus::Other);
        assert_eq!(HealthStatus::from_code(2), HealthStatus::Unknown);
        assert_eq!(HealthStatus::from_code(3), HealthStatus::Ok);
        assert_eq!(HealthStatus::from_code(4), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_code(5), HealthStatus::Critical);
        assert_eq!(HealthStatus::from_code(6), HealthStatus::NonRecoverable);
        assert_eq!(HealthStatus::from_code(0), HealthStatus::Unknown);
        assert_eq!(HealthStatus::from_code(42), HealthStatus::Unknown);
    }

    #[test]
    fn severity_order_is_total_over_known_statuses() {
        let ordered = [
            HealthStatus::Ok,
            HealthStatus::Other,
            HealthStatus::Warning,
            HealthStatus::NonRecoverable,
            HealthStatus::Critical,
        ];

        for pair in ordered.windows(2) {
            assert!(pair[1].outranks(pair[0]), "{} should outrank {}", pair[1], pair[0]);
            assert!(!pair[0].outranks(pair[1]));
        }
    }

    #[test]
    fn unknown_never_outranks() {
        assert!(!HealthStatus::Unknown.outranks(HealthStatus::Ok));
        assert!(HealthStatus::Ok.outranks(HealthStatus::Unknown));
        assert!(!HealthStatus::Unknown.is_known());
    }

    #[test]
    fn serializes_as_kebab_case() {
        let json = serde_json::to_string(&HealthStatus::NonRecoverable).unwrap();
        assert_eq!(json, "\"non-recoverable\"");
        assert_eq!(HealthStatus::NonRecoverable.as_str(), "non-recoverable");
    }
}
