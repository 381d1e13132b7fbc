//! Range queries over a series
//!
//! Supports:
//! - Lazy inclusive range scans across chunks
//! - Snapshot semantics: the iterator owns `Arc` handles to the chunks it
//!   was built from, so later appends copy on write instead of mutating them
//! - Bucketed aggregation of a scanned range

mod aggregate;

pub use aggregate::aggregate_range;

use crate::chunk::Chunk;
use crate::{Sample, TimeRange};
use std::iter::FusedIterator;
use std::sync::Arc;

/// Forward-only iterator over the samples of a series within a range
#[derive(Debug, Clone)]
pub struct SeriesIter {
    chunks: Vec<Arc<Chunk>>,
    range: TimeRange,
    chunk_idx: usize,
    /// Position inside the current chunk, set once the chunk is entered
    cursor: Option<usize>,
}

impl SeriesIter {
    /// Build an iterator over a chunk snapshot
    pub fn new(chunks: Vec<Arc<Chunk>>, range: TimeRange) -> Self {
        Self {
            chunks,
            range,
            chunk_idx: 0,
            cursor: None,
        }
    }

    /// Range this iterator was built for
    pub fn range(&self) -> TimeRange {
        self.range
    }

    fn exhaust(&mut self) {
        self.chunk_idx = self.chunks.len();
        self.cursor = None;
    }
}

impl Iterator for SeriesIter {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            let chunk = self.chunks.get(self.chunk_idx)?;

            let pos = match self.cursor {
                Some(pos) => pos,
                None => {
                    if !chunk.overlaps(&self.range) {
                        // chunks are ordered, nothing after a chunk past the end can match
                        if chunk.first_timestamp().map_or(false, |first| first > self.range.end) {
                            self.exhaust();
                            return None;
                        }
                        self.chunk_idx += 1;
                        continue;
                    }
                    chunk.lower_bound(self.range.start)
                }
            };

            match chunk.samples().get(pos) {
                Some(sample) if sample.timestamp <= self.range.end => {
                    self.cursor = Some(pos + 1);
                    return Some(*sample);
                }
                Some(_) => {
                    self.exhaust();
                    return None;
                }
                None => {
                    self.chunk_idx += 1;
                    self.cursor = None;
                }
            }
        }
    }
}

impl FusedIterator for SeriesIter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(layout: &[&[u64]]) -> Vec<Arc<Chunk>> {
        layout
            .iter()
            .map(|timestamps| {
                let mut chunk = Chunk::new(timestamps.len().max(1));
                for ts in timestamps.iter() {
                    chunk.append(Sample::new(*ts, *ts as f64));
                }
                Arc::new(chunk)
            })
            .collect()
    }

    fn timestamps(iter: SeriesIter) -> Vec<u64> {
        iter.map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_range_spans_chunks() {
        let data = chunks(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]]);

        let iter = SeriesIter::new(data.clone(), TimeRange::new(2, 8).unwrap());
        assert_eq!(timestamps(iter), vec![2, 3, 4, 5, 6, 7, 8]);

        let iter = SeriesIter::new(data, TimeRange::all());
        assert_eq!(timestamps(iter).len(), 9);
    }

    #[test]
    fn test_range_inside_gap() {
        let data = chunks(&[&[10, 20], &[30, 40]]);
        let iter = SeriesIter::new(data, TimeRange::new(21, 29).unwrap());
        assert_eq!(timestamps(iter), Vec::<u64>::new());
    }

    #[test]
    fn test_range_keeps_duplicates() {
        let data = chunks(&[&[1, 5], &[5, 5], &[9]]);
        let iter = SeriesIter::new(data, TimeRange::new(5, 5).unwrap());
        assert_eq!(timestamps(iter), vec![5, 5, 5]);
    }

    #[test]
    fn test_restartable() {
        let data = chunks(&[&[1, 2], &[3]]);
        let range = TimeRange::new(0, 10).unwrap();

        let first: Vec<_> = SeriesIter::new(data.clone(), range).collect();
        let second: Vec<_> = SeriesIter::new(data, range).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fused_after_end() {
        let data = chunks(&[&[1, 2, 3]]);
        let mut iter = SeriesIter::new(data, TimeRange::new(1, 1).unwrap());
        assert_eq!(iter.next().map(|s| s.timestamp), Some(1));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
