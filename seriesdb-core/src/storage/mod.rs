//! Storage engine - owns every series and routes compaction output

mod engine;
mod shared;

pub use engine::{Engine, RangeResult};
pub use shared::SharedEngine;

use crate::codec::ReplayPolicy;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retention applied when a series is created without one
    pub retention_secs: u64,
    /// Chunk capacity applied when a series is created without one
    pub max_samples_per_chunk: usize,
    /// Maximum rule hops one write may propagate through
    pub max_propagation_depth: usize,
    /// Whether loading replays samples through compaction rules
    pub replay_policy: ReplayPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_secs: crate::config::RETENTION_DEFAULT_SECS,
            max_samples_per_chunk: crate::config::SAMPLES_PER_CHUNK_DEFAULT,
            max_propagation_depth: crate::config::MAX_PROPAGATION_DEPTH,
            replay_policy: ReplayPolicy::default(),
        }
    }
}
