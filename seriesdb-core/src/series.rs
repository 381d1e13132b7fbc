//! Series - the per-key time-series value
//!
//! A series owns its chunk sequence, retention policy, labels and the ordered
//! chain of compaction rules fed by every accepted sample.

use crate::chunk::Chunk;
use crate::compaction::{CompactionRule, Emission};
use crate::query::SeriesIter;
use crate::{AggregationType, Labels, Result, Sample, SeriesError, TimeRange, Timestamp};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A validated sample waiting to be stored, with the rule state it leaves
/// behind
#[derive(Debug)]
pub struct PendingSample {
    sample: Sample,
    rules: Vec<CompactionRule>,
    /// Buckets the sample closes, in chain order
    pub emissions: Vec<Emission>,
}

/// A single time series
#[derive(Debug, Clone)]
pub struct Series {
    key: String,
    retention_secs: u64,
    max_samples_per_chunk: usize,
    labels: Labels,
    chunks: Vec<Arc<Chunk>>,
    rules: Vec<CompactionRule>,
    last_timestamp: Timestamp,
    total_samples: u64,
}

impl Series {
    /// Create an empty series
    pub fn new(
        key: impl Into<String>,
        labels: Labels,
        retention_secs: u64,
        max_samples_per_chunk: usize,
    ) -> Result<Self> {
        if max_samples_per_chunk == 0 {
            return Err(SeriesError::InvalidArgument(
                "Chunk capacity must be greater than zero".into(),
            ));
        }
        Ok(Self {
            key: key.into(),
            retention_secs,
            max_samples_per_chunk,
            labels,
            chunks: Vec::new(),
            rules: Vec::new(),
            last_timestamp: 0,
            total_samples: 0,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    pub fn max_samples_per_chunk(&self) -> usize {
        self.max_samples_per_chunk
    }

    /// Timestamp of the newest accepted sample (0 before the first one)
    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    /// Number of samples held in chunks
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    /// Compaction rules in chain order
    pub fn rules(&self) -> &[CompactionRule] {
        &self.rules
    }

    /// Newest stored sample
    pub fn last_sample(&self) -> Option<Sample> {
        self.chunks
            .last()
            .and_then(|chunk| chunk.samples().last().copied())
    }

    /// Samples older than this are outside the retention window
    pub fn retention_cutoff(&self) -> Option<Timestamp> {
        if self.retention_secs == 0 || self.total_samples == 0 {
            return None;
        }
        Some(self.last_timestamp.saturating_sub(self.retention_secs))
    }

    /// Append a sample and feed it through the rule chain.
    ///
    /// Returns the aggregated samples the rules emitted, in chain order. On
    /// error nothing was changed.
    pub fn add_sample(&mut self, timestamp: Timestamp, value: f64) -> Result<Vec<Emission>> {
        let mut pending = self.prepare_sample(timestamp, value)?;
        let emissions = std::mem::take(&mut pending.emissions);
        self.commit_sample(pending);
        Ok(emissions)
    }

    /// Validate a sample and run it through copies of the rules.
    ///
    /// The series itself is untouched until the result is passed to
    /// [`Series::commit_sample`].
    pub fn prepare_sample(&self, timestamp: Timestamp, value: f64) -> Result<PendingSample> {
        self.check_timestamp(timestamp)?;
        for rule in &self.rules {
            rule.check(timestamp)?;
        }

        let sample = Sample::new(timestamp, value);
        let mut rules = self.rules.clone();
        let mut emissions = Vec::new();
        for rule in &mut rules {
            if let Some(emitted) = rule.ingest(sample)? {
                debug!(
                    "Rule {} -> {} closed bucket {} with {}",
                    self.key,
                    rule.dest_key(),
                    emitted.timestamp,
                    emitted.value
                );
                emissions.push(Emission {
                    dest_key: rule.dest_key().to_string(),
                    sample: emitted,
                });
            }
        }
        Ok(PendingSample {
            sample,
            rules,
            emissions,
        })
    }

    /// Store a prepared sample and adopt the rule state it produced
    pub fn commit_sample(&mut self, pending: PendingSample) {
        self.store(pending.sample);
        self.rules = pending.rules;
    }

    /// Append a sample without feeding the rule chain
    pub fn append_sample(&mut self, timestamp: Timestamp, value: f64) -> Result<()> {
        self.check_timestamp(timestamp)?;
        self.store(Sample::new(timestamp, value));
        Ok(())
    }

    /// Overwrite the value of the newest sample in place
    pub(crate) fn update_last_value(&mut self, value: f64) -> Result<()> {
        let chunk = self
            .chunks
            .last_mut()
            .ok_or_else(|| SeriesError::NotExists(format!("{} has no samples", self.key)))?;
        Arc::make_mut(chunk).update_last(value);
        Ok(())
    }

    /// Attach a rule at the end of the chain
    pub fn add_rule(&mut self, rule: CompactionRule) -> Result<()> {
        if self.rules.iter().any(|r| r.dest_key() == rule.dest_key()) {
            return Err(SeriesError::RuleExists {
                source_key: self.key.clone(),
                dest_key: rule.dest_key().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Detach the rule feeding `dest_key`
    pub fn remove_rule(&mut self, dest_key: &str) -> Result<CompactionRule> {
        let pos = self
            .rules
            .iter()
            .position(|r| r.dest_key() == dest_key)
            .ok_or_else(|| {
                SeriesError::NotExists(format!("rule from {} to {}", self.key, dest_key))
            })?;
        Ok(self.rules.remove(pos))
    }

    /// Snapshot iterator over `[start, end]`, excluding expired samples
    pub fn query(&self, start: Timestamp, end: Timestamp) -> Result<SeriesIter> {
        let mut range = TimeRange::new(start, end)?;
        if let Some(cutoff) = self.retention_cutoff() {
            range.start = range.start.max(cutoff);
        }
        Ok(SeriesIter::new(self.chunks.clone(), range))
    }

    /// Every retained sample in order
    pub fn samples(&self) -> Vec<Sample> {
        match self.query(0, self.last_timestamp) {
            Ok(iter) => iter.collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Summary of the series state
    pub fn info(&self) -> SeriesInfo {
        SeriesInfo {
            key: self.key.clone(),
            total_samples: self.total_samples,
            chunk_count: self.chunks.len(),
            last_timestamp: self.last_timestamp,
            retention_secs: self.retention_secs,
            max_samples_per_chunk: self.max_samples_per_chunk,
            labels: self
                .labels
                .iter()
                .map(|l| (l.key.clone(), l.value.clone()))
                .collect(),
            rules: self
                .rules
                .iter()
                .map(|r| RuleInfo {
                    dest_key: r.dest_key().to_string(),
                    bucket_secs: r.bucket_secs(),
                    aggregation: r.agg_type(),
                })
                .collect(),
        }
    }

    fn check_timestamp(&self, timestamp: Timestamp) -> Result<()> {
        if timestamp < self.last_timestamp {
            return Err(SeriesError::TimestampTooOld {
                timestamp,
                last: self.last_timestamp,
            });
        }
        Ok(())
    }

    fn store(&mut self, sample: Sample) {
        if self.chunks.last().map_or(true, |chunk| chunk.is_full()) {
            self.chunks
                .push(Arc::new(Chunk::new(self.max_samples_per_chunk)));
        }
        if let Some(chunk) = self.chunks.last_mut() {
            Arc::make_mut(chunk).append(sample);
        }
        self.last_timestamp = sample.timestamp;
        self.total_samples += 1;
        self.evict_expired();
    }

    fn evict_expired(&mut self) {
        let Some(cutoff) = self.retention_cutoff() else {
            return;
        };
        let expired = self
            .chunks
            .iter()
            .take(self.chunks.len().saturating_sub(1))
            .take_while(|chunk| chunk.last_timestamp().map_or(true, |last| last < cutoff))
            .count();
        if expired == 0 {
            return;
        }
        for chunk in self.chunks.drain(..expired) {
            self.total_samples -= chunk.len() as u64;
        }
        debug!("Evicted {} expired chunks from {}", expired, self.key);
    }
}

/// Rule summary reported by [`Series::info`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleInfo {
    pub dest_key: String,
    pub bucket_secs: u64,
    pub aggregation: AggregationType,
}

/// Series summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesInfo {
    pub key: String,
    pub total_samples: u64,
    pub chunk_count: usize,
    pub last_timestamp: Timestamp,
    pub retention_secs: u64,
    pub max_samples_per_chunk: usize,
    pub labels: Vec<(String, String)>,
    pub rules: Vec<RuleInfo>,
}
