//! Fixed-capacity sample chunks
//!
//! A chunk is the storage unit of a series: an append-only, timestamp-ordered
//! block of at most `capacity` samples. Series hold chunks behind `Arc` so a
//! range iterator can keep a snapshot while the writer copies on write.

use crate::config::SAMPLES_PER_CHUNK_DEFAULT;
use crate::{Sample, TimeRange, Timestamp};

/// Append-only block of samples
#[derive(Debug, Clone)]
pub struct Chunk {
    samples: Vec<Sample>,
    capacity: usize,
}

impl Chunk {
    /// Create an empty chunk holding at most `capacity` samples.
    ///
    /// Only the default chunk size is reserved up front; larger chunks grow
    /// on demand.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.min(SAMPLES_PER_CHUNK_DEFAULT)),
            capacity,
        }
    }

    /// Append a sample. Returns false if the chunk is full.
    ///
    /// Callers guarantee the sample is not older than the last one.
    pub fn append(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        debug_assert!(self.last_timestamp().map_or(true, |last| sample.timestamp >= last));
        self.samples.push(sample);
        true
    }

    /// Check if no more samples fit
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Timestamp of the oldest sample
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Timestamp of the newest sample
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// All samples in stored order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Check if any sample may fall inside the range
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => range.overlaps(first, last),
            _ => false,
        }
    }

    /// Index of the first sample with timestamp >= `ts`
    pub fn lower_bound(&self, ts: Timestamp) -> usize {
        self.samples.partition_point(|s| s.timestamp < ts)
    }

    /// Overwrite the value of the newest sample
    pub(crate) fn update_last(&mut self, value: f64) -> bool {
        match self.samples.last_mut() {
            Some(last) => {
                last.value = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_append_until_full() {
        let mut chunk = Chunk::new(3);
        for i in 0..3 {
            assert!(chunk.append(Sample::new(i, i as f64)));
        }
        assert!(chunk.is_full());
        assert!(!chunk.append(Sample::new(10, 1.0)));
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.first_timestamp(), Some(0));
        assert_eq!(chunk.last_timestamp(), Some(2));
    }

    #[test]
    fn test_chunk_lower_bound_with_duplicates() {
        let mut chunk = Chunk::new(8);
        for ts in [1, 3, 3, 3, 7] {
            chunk.append(Sample::new(ts, 0.0));
        }

        assert_eq!(chunk.lower_bound(0), 0);
        assert_eq!(chunk.lower_bound(3), 1);
        assert_eq!(chunk.lower_bound(4), 4);
        assert_eq!(chunk.lower_bound(8), 5);
    }

    #[test]
    fn test_chunk_overlaps() {
        let mut chunk = Chunk::new(4);
        assert!(!chunk.overlaps(&TimeRange::all()));

        chunk.append(Sample::new(10, 1.0));
        chunk.append(Sample::new(20, 2.0));
        assert!(chunk.overlaps(&TimeRange::new(15, 30).unwrap()));
        assert!(!chunk.overlaps(&TimeRange::new(21, 30).unwrap()));
    }
}
