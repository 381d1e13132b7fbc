//! Compaction rules
//!
//! A rule downsamples its source series into a destination series. Samples
//! are grouped into buckets of `bucket_secs` aligned to multiples of the bucket
//! size. When a sample opens a newer bucket, the previous bucket is finalized
//! and emitted as a single sample stamped with that bucket's start.
//!
//! The newest bucket stays open until a later bucket supersedes it; it is
//! never flushed by ingestion alone.

mod aggregates;

pub use aggregates::AggregationContext;

use crate::codec::{RecordReader, RecordWriter};
use crate::{AggregationType, Result, Sample, SeriesError, Timestamp};
use tracing::error;

/// An aggregated sample bound for a destination series
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Destination series key
    pub dest_key: String,
    /// Bucket start and aggregated value
    pub sample: Sample,
}

/// Downsampling link from a source series to a destination series
#[derive(Debug, Clone)]
pub struct CompactionRule {
    dest_key: String,
    bucket_secs: u64,
    context: AggregationContext,
    bucket_start: Option<Timestamp>,
}

impl CompactionRule {
    /// Create a rule with an empty context
    pub fn new(dest_key: impl Into<String>, agg: AggregationType, bucket_secs: u64) -> Result<Self> {
        if bucket_secs == 0 {
            return Err(SeriesError::InvalidArgument(
                "Bucket size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dest_key: dest_key.into(),
            bucket_secs,
            context: AggregationContext::new(agg),
            bucket_start: None,
        })
    }

    pub fn dest_key(&self) -> &str {
        &self.dest_key
    }

    pub fn bucket_secs(&self) -> u64 {
        self.bucket_secs
    }

    pub fn agg_type(&self) -> AggregationType {
        self.context.agg_type()
    }

    /// Accumulator of the open bucket
    pub fn context(&self) -> &AggregationContext {
        &self.context
    }

    /// Start of the open bucket, if any sample was seen
    pub fn bucket_start(&self) -> Option<Timestamp> {
        self.bucket_start
    }

    /// Rules with the `none` variant never accumulate or emit
    pub fn is_disabled(&self) -> bool {
        self.agg_type() == AggregationType::None
    }

    /// Bucket a timestamp belongs to
    pub fn bucket_for(&self, ts: Timestamp) -> Timestamp {
        ts - ts % self.bucket_secs
    }

    /// Verify a sample at `ts` can be ingested without violating bucket order
    pub fn check(&self, ts: Timestamp) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }
        let bucket = self.bucket_for(ts);
        match self.bucket_start {
            Some(open) if bucket < open => {
                error!(
                    "Bucket regression in rule to {}: sample {} maps to bucket {} before open bucket {}",
                    self.dest_key, ts, bucket, open
                );
                Err(SeriesError::Internal(format!(
                    "bucket {} precedes open bucket {} of rule to {}",
                    bucket, open, self.dest_key
                )))
            }
            Some(open) if bucket > open && self.context.is_empty() => {
                error!(
                    "Rule to {} would close bucket {} without samples",
                    self.dest_key, open
                );
                Err(SeriesError::EmptyAggregation(self.agg_type().to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Feed a source sample, returning the closed bucket's sample if any
    pub fn ingest(&mut self, sample: Sample) -> Result<Option<Sample>> {
        if self.is_disabled() {
            return Ok(None);
        }
        self.check(sample.timestamp)?;

        let bucket = self.bucket_for(sample.timestamp);
        let emitted = match self.bucket_start {
            Some(open) if bucket > open => {
                let value = self.context.finalize()?;
                self.context.reset();
                Some(Sample::new(open, value))
            }
            _ => None,
        };

        self.bucket_start = Some(bucket);
        self.context.add(sample.value);
        Ok(emitted)
    }

    /// Drop the open bucket and its accumulated state
    pub fn reset(&mut self) {
        self.context.reset();
        self.bucket_start = None;
    }

    /// Write open bucket and context state
    pub(crate) fn encode_context(&self, writer: &mut RecordWriter) {
        writer.put_bool(self.bucket_start.is_some());
        writer.put_unsigned(self.bucket_start.unwrap_or(0));
        self.context.encode(writer);
    }

    /// Rebuild a rule from its persisted header fields and context
    pub(crate) fn decode(
        dest_key: String,
        bucket_secs: u64,
        agg: AggregationType,
        reader: &mut RecordReader<'_>,
    ) -> Result<Self> {
        let mut rule = Self::new(dest_key, agg, bucket_secs)
            .map_err(|e| SeriesError::InvalidFormat(e.to_string()))?;
        let has_bucket = reader.get_bool("rule bucket flag")?;
        let bucket_start = reader.get_unsigned("rule bucket start")?;
        rule.bucket_start = has_bucket.then_some(bucket_start);
        rule.context = AggregationContext::decode(agg, reader)?;
        Ok(rule)
    }
}
