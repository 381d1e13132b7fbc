//! Error types for SeriesDB

use crate::Timestamp;
use thiserror::Error;

/// Result type alias for SeriesDB operations
pub type Result<T> = std::result::Result<T, SeriesError>;

/// Coarse error classification reported to the command layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Write rejected because it is older than the last sample
    TimestampTooOld,
    /// Query bounds are invalid
    InvalidRange,
    /// An aggregation was finalized without any samples
    EmptyAggregation,
    /// Persisted data uses an unknown encoding version
    EncodingVersionMismatch,
    /// A persisted sample could not be replayed
    CorruptSample,
    /// The referenced series or rule does not exist
    NotExists,
    /// Anything else
    GenericError,
}

/// SeriesDB error types
#[derive(Error, Debug)]
pub enum SeriesError {
    /// Sample is older than the newest accepted sample
    #[error("Timestamp {timestamp} is older than last timestamp {last}")]
    TimestampTooOld { timestamp: Timestamp, last: Timestamp },

    /// Query start is after query end
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: Timestamp, end: Timestamp },

    /// Finalize called on an aggregation that saw no samples
    #[error("Empty aggregation: {0} finalized with no samples")]
    EmptyAggregation(String),

    /// Persisted encoding version is not the one this build writes
    #[error("Encoding version mismatch: expected {expected}, got {actual}")]
    EncodingVersionMismatch { expected: u64, actual: u64 },

    /// A persisted sample was rejected during replay
    #[error("Corrupt sample at {timestamp}: {reason}")]
    CorruptSample { timestamp: Timestamp, reason: String },

    /// Series or rule not found
    #[error("Not exists: {0}")]
    NotExists(String),

    /// Series key already taken
    #[error("Series already exists: {0}")]
    AlreadyExists(String),

    /// Source already has a rule feeding this destination
    #[error("Compaction rule from {source_key} to {dest_key} already exists")]
    RuleExists { source_key: String, dest_key: String },

    /// Rule graph would feed a series back into itself
    #[error("Compaction rule cycle: {0}")]
    RuleCycle(String),

    /// Malformed label filter
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Argument out of accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Byte stream does not follow the record layout
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SeriesError {
    /// Map onto the error kinds exposed to the command layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeriesError::TimestampTooOld { .. } => ErrorKind::TimestampTooOld,
            SeriesError::InvalidRange { .. } => ErrorKind::InvalidRange,
            SeriesError::EmptyAggregation(_) => ErrorKind::EmptyAggregation,
            SeriesError::EncodingVersionMismatch { .. } => ErrorKind::EncodingVersionMismatch,
            SeriesError::CorruptSample { .. } => ErrorKind::CorruptSample,
            SeriesError::NotExists(_) => ErrorKind::NotExists,
            _ => ErrorKind::GenericError,
        }
    }

    /// Check if error indicates corrupt persisted data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SeriesError::CorruptSample { .. } | SeriesError::InvalidFormat(_)
        )
    }

    /// Check if error aborts a whole load rather than a single sample
    pub fn is_fatal_for_load(&self) -> bool {
        matches!(
            self,
            SeriesError::EncodingVersionMismatch { .. }
                | SeriesError::InvalidFormat(_)
                | SeriesError::Io(_)
        )
    }
}
