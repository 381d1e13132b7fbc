//! Thread-safe engine handle
//!
//! Writers take the lock exclusively. Readers hold the shared lock only long
//! enough to clone the chunk list of a series, then iterate without it.

use super::{Engine, EngineConfig};
use crate::query::SeriesIter;
use crate::{AggregationType, Labels, Result, Timestamp};
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Cloneable handle to an engine shared across threads
#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_engine(Engine::new(config))
    }

    pub fn from_engine(engine: Engine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Shared access for multi-step reads
    pub fn read(&self) -> RwLockReadGuard<'_, Engine> {
        self.inner.read()
    }

    /// Exclusive access for multi-step writes
    pub fn write(&self) -> RwLockWriteGuard<'_, Engine> {
        self.inner.write()
    }

    pub fn create_series(&self, key: &str, labels: Labels) -> Result<()> {
        self.inner.write().create_series_with_defaults(key, labels)?;
        Ok(())
    }

    pub fn create_rule(
        &self,
        source: &str,
        dest: &str,
        bucket_secs: u64,
        agg: AggregationType,
    ) -> Result<()> {
        self.inner.write().create_rule(source, dest, bucket_secs, agg)
    }

    pub fn add_sample(&self, key: &str, timestamp: Timestamp, value: f64) -> Result<()> {
        self.inner.write().add_sample(key, timestamp, value)
    }

    /// Snapshot iterator that does not hold the lock
    pub fn query(&self, key: &str, start: Timestamp, end: Timestamp) -> Result<SeriesIter> {
        self.inner.read().query(key, start, end)
    }

    pub fn save_snapshot(&self) -> Bytes {
        self.inner.read().save_snapshot()
    }
}
