//! Bucketed aggregation over a scanned range

use crate::compaction::AggregationContext;
use crate::{AggregationType, Result, Sample, SeriesError, Timestamp};

/// Group samples into `bucket_secs` buckets and aggregate each one.
///
/// Unlike compaction rules, the last bucket is emitted even if more samples
/// could still arrive for it.
pub fn aggregate_range<I>(samples: I, agg: AggregationType, bucket_secs: u64) -> Result<Vec<Sample>>
where
    I: IntoIterator<Item = Sample>,
{
    if bucket_secs == 0 {
        return Err(SeriesError::InvalidArgument(
            "Bucket size must be greater than zero".into(),
        ));
    }
    if agg == AggregationType::None {
        return Err(SeriesError::InvalidArgument(
            "Range aggregation requires an aggregation type".into(),
        ));
    }

    let mut results = Vec::new();
    let mut ctx = AggregationContext::new(agg);
    let mut open: Option<Timestamp> = None;

    for sample in samples {
        let bucket = sample.timestamp - sample.timestamp % bucket_secs;
        match open {
            Some(start) if start != bucket => {
                results.push(Sample::new(start, ctx.finalize()?));
                ctx.reset();
            }
            _ => {}
        }
        open = Some(bucket);
        ctx.add(sample.value);
    }

    if let Some(start) = open {
        results.push(Sample::new(start, ctx.finalize()?));
    }

    Ok(results)
}
