//! Symbolic time ranges for range queries.
//!
//! Range queries are always expressed through one of these symbols, never with
//! free-form durations. Each symbol maps to a fixed lookback and step.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const HOUR: u64 = 3_600;
const DAY: u64 = 86_400;

/// Lookback, end offset and step for a symbolic range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// Seconds between the start and the end of the window.
    pub lookback_secs: u64,
    /// Seconds the window end sits before "now". Zero for live ranges.
    pub end_offset_secs: u64,
    /// Resolution step in the metrics backend's duration syntax.
    pub step: &'static str,
}

impl RangeSpec {
    const fn live(lookback_secs: u64, step: &'static str) -> Self {
        Self {
            lookback_secs,
            end_offset_secs: 0,
            step,
        }
    }

    /// Resolve this range against a reference instant.
    pub fn window_at(&self, now: DateTime<Utc>) -> RangeWindow {
        let end = now - Duration::seconds(self.end_offset_secs as i64);
        RangeWindow {
            start: end - Duration::seconds(self.lookback_secs as i64),
            end,
            step: self.step,
        }
    }
}

/// A concrete `[start, end]` window at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: &'static str,
}

/// Error returned when a range symbol is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range '{0}'")]
pub struct UnknownRange(pub String);

/// General purpose ranges used for job, resource and occupation analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl TimeRange {
    /// Every range, shortest first.
    pub const ALL: [TimeRange; 4] = [
        TimeRange::Hour,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
    ];

    pub fn spec(&self) -> RangeSpec {
        match self {
            TimeRange::Hour => RangeSpec::live(HOUR, "1m"),
            TimeRange::Day => RangeSpec::live(DAY, "5m"),
            TimeRange::Week => RangeSpec::live(7 * DAY, "30m"),
            TimeRange::Month => RangeSpec::live(30 * DAY, "4h"),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }

    /// Parse a symbol, falling back to `24h` for anything unrecognized.
    pub fn parse_or_default(symbol: &str) -> Self {
        symbol.parse().unwrap_or_default()
    }
}

impl FromStr for TimeRange {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::Hour),
            "24h" => Ok(TimeRange::Day),
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            other => Err(UnknownRange(other.to_string())),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Ranges used for power history.
///
/// `yesterday` is the full day that ended 24 hours ago, so it never overlaps
/// with `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PowerRange {
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "1d")]
    Day,
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl PowerRange {
    pub const ALL: [PowerRange; 4] = [
        PowerRange::Yesterday,
        PowerRange::Day,
        PowerRange::Week,
        PowerRange::Month,
    ];

    pub fn spec(&self) -> RangeSpec {
        match self {
            PowerRange::Yesterday => RangeSpec {
                lookback_secs: DAY,
                end_offset_secs: DAY,
                step: "1h",
            },
            PowerRange::Day => RangeSpec::live(DAY, "1h"),
            PowerRange::Week => RangeSpec::live(7 * DAY, "6h"),
            PowerRange::Month => RangeSpec::live(30 * DAY, "1d"),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            PowerRange::Yesterday => "yesterday",
            PowerRange::Day => "1d",
            PowerRange::Week => "7d",
            PowerRange::Month => "30d",
        }
    }

    /// Parse a symbol, falling back to `7d` for anything unrecognized.
    pub fn parse_or_default(symbol: &str) -> Self {
        symbol.parse().unwrap_or_default()
    }
}

impl FromStr for PowerRange {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yesterday" => Ok(PowerRange::Yesterday),
            "1d" => Ok(PowerRange::Day),
            "7d" => Ok(PowerRange::Week),
            "30d" => Ok(PowerRange::Month),
            other => Err(UnknownRange(other.to_string())),
        }
    }
}

impl fmt::Display for PowerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
