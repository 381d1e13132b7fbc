//! Persistence codec
//!
//! A series record is a fixed sequence of fields:
//!
//! 1. encoding version
//! 2. series key
//! 3. retention seconds
//! 4. max samples per chunk
//! 5. label count, then key and value of every label
//! 6. rule count, then per rule: destination key, bucket size, aggregation
//!    ordinal, open bucket flag and start, aggregation state
//! 7. sample count, then timestamp and value of every retained sample
//!
//! Samples are written from a full-range query, so the record does not depend
//! on how the series happened to be chunked in memory.

mod primitives;
mod series;
mod snapshot;

pub use primitives::{RecordReader, RecordWriter};
pub use series::{decode_series, encode_series};
pub use snapshot::{decode_snapshot, encode_snapshot};

use crate::compaction::Emission;
use crate::series::Series;
use crate::Sample;

/// How persisted samples interact with the rule chain on load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayPolicy {
    /// Keep the persisted rule contexts and replay samples without feeding
    /// rules. Destination series are expected to be restored from their own
    /// records.
    #[default]
    Suppress,
    /// Start rules with empty contexts and feed every replayed sample through
    /// them, collecting the emissions for the caller to route.
    Propagate,
}

/// Outcome of a best-effort load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Samples replayed into the series
    pub loaded_samples: u64,
    /// Samples rejected during replay
    pub skipped_samples: Vec<Sample>,
    /// The sample section ended early
    pub truncated: bool,
}

impl LoadReport {
    /// Check if every persisted sample was recovered
    pub fn is_clean(&self) -> bool {
        self.skipped_samples.is_empty() && !self.truncated
    }
}

/// A series rebuilt from its record
#[derive(Debug)]
pub struct DecodedSeries {
    pub series: Series,
    /// Emissions produced under [`ReplayPolicy::Propagate`]
    pub emissions: Vec<Emission>,
    pub report: LoadReport,
}
