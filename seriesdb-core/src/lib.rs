//! SeriesDB Core - Embedded Time-Series Storage Engine
//!
//! A time-series data type for a key-value host, providing:
//! - Chunked, append-only sample storage with retention
//! - Compaction rules that downsample a series into aggregated series
//! - A label index for metadata-based discovery
//! - A versioned binary codec for snapshots and replication
//!
//! # Architecture
//!
//! - **Chunk**: fixed-capacity block of samples, shared copy-on-write
//! - **Series**: chunk sequence, retention, labels and an ordered rule chain
//! - **Compaction**: per-rule aggregation contexts that emit one sample per closed bucket
//! - **Query**: snapshot range iterator and bucketed aggregation
//! - **Index**: label → series key postings with filter queries
//! - **Codec**: series records and multi-series snapshots
//! - **Storage**: the engine keyspace that routes emissions between series

pub mod chunk;
pub mod codec;
pub mod compaction;
pub mod index;
pub mod query;
pub mod series;
pub mod storage;

mod error;
mod types;

pub use error::{ErrorKind, Result, SeriesError};
pub use types::*;

/// SeriesDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default retention in seconds (0 keeps everything)
    pub const RETENTION_DEFAULT_SECS: u64 = 0;

    /// Default maximum samples per chunk
    pub const SAMPLES_PER_CHUNK_DEFAULT: usize = 360;

    /// Encoding version written in front of every series record
    pub const ENCODING_VERSION: u64 = 1;

    /// Magic bytes opening a snapshot
    pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SDBS";

    /// Snapshot framing version
    pub const SNAPSHOT_VERSION: u64 = 1;

    /// Maximum rule hops a single write may propagate through
    pub const MAX_PROPAGATION_DEPTH: usize = 32;
}
