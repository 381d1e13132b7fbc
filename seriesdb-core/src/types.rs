//! Core types for SeriesDB

use crate::{Result, SeriesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp in seconds (host-defined tick)
pub type Timestamp = u64;

/// A single stored sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample time
    pub timestamp: Timestamp,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Key/value metadata attached to a series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered label set of a series
pub type Labels = Vec<Label>;

/// Inclusive time range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a validated time range
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start > end {
            return Err(SeriesError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The range covering every representable timestamp
    pub fn all() -> Self {
        Self {
            start: 0,
            end: Timestamp::MAX,
        }
    }

    /// Check if a timestamp is within the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check if a span [first, last] overlaps the range
    pub fn overlaps(&self, first: Timestamp, last: Timestamp) -> bool {
        first <= self.end && last >= self.start
    }
}

/// Aggregation variants usable by compaction rules and aggregated queries.
///
/// Discriminants are the persisted ordinals and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum AggregationType {
    None = 0,
    Min = 1,
    Max = 2,
    Sum = 3,
    Avg = 4,
    Count = 5,
    First = 6,
    Last = 7,
    Range = 8,
}

impl AggregationType {
    /// Every variant in ordinal order
    pub const ALL: [AggregationType; 9] = [
        AggregationType::None,
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::Sum,
        AggregationType::Avg,
        AggregationType::Count,
        AggregationType::First,
        AggregationType::Last,
        AggregationType::Range,
    ];

    /// Persisted ordinal
    pub fn ordinal(self) -> u64 {
        self as u64
    }

    /// Upper-case name as reported by info
    pub fn name(self) -> &'static str {
        match self {
            AggregationType::None => "NONE",
            AggregationType::Min => "MIN",
            AggregationType::Max => "MAX",
            AggregationType::Sum => "SUM",
            AggregationType::Avg => "AVG",
            AggregationType::Count => "COUNT",
            AggregationType::First => "FIRST",
            AggregationType::Last => "LAST",
            AggregationType::Range => "RANGE",
        }
    }
}

impl TryFrom<u64> for AggregationType {
    type Error = SeriesError;

    fn try_from(value: u64) -> Result<Self> {
        AggregationType::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| {
                SeriesError::InvalidFormat(format!("Invalid aggregation ordinal: {}", value))
            })
    }
}

impl FromStr for AggregationType {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self> {
        AggregationType::ALL
            .iter()
            .copied()
            .find(|agg| agg.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SeriesError::InvalidArgument(format!("Unknown aggregation: {}", s)))
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
