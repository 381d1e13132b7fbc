//! Series record encoding

use super::{DecodedSeries, LoadReport, RecordReader, RecordWriter, ReplayPolicy};
use crate::compaction::CompactionRule;
use crate::config::ENCODING_VERSION;
use crate::series::Series;
use crate::{AggregationType, Label, Result, Sample, SeriesError};
use bytes::Bytes;
use tracing::{error, warn};

/// Serialize a series, its rules with their open buckets, and its samples
pub fn encode_series(series: &Series) -> Bytes {
    let samples = series.samples();
    let mut writer = RecordWriter::with_capacity(128 + samples.len() * 16);

    writer.put_unsigned(ENCODING_VERSION);
    writer.put_string(series.key());
    writer.put_unsigned(series.retention_secs());
    writer.put_unsigned(series.max_samples_per_chunk() as u64);

    writer.put_unsigned(series.labels().len() as u64);
    for label in series.labels() {
        writer.put_string(&label.key);
        writer.put_string(&label.value);
    }

    writer.put_unsigned(series.rules().len() as u64);
    for rule in series.rules() {
        writer.put_string(rule.dest_key());
        writer.put_unsigned(rule.bucket_secs());
        writer.put_unsigned(rule.agg_type().ordinal());
        rule.encode_context(&mut writer);
    }

    writer.put_unsigned(samples.len() as u64);
    for sample in &samples {
        writer.put_unsigned(sample.timestamp);
        writer.put_double(sample.value);
    }

    writer.finish()
}

/// Rebuild a series from a record.
///
/// Fails on a version mismatch or a malformed header. Samples that cannot be
/// replayed are skipped with a warning, and a record cut off inside the
/// sample section keeps what was read.
pub fn decode_series(data: &[u8], policy: ReplayPolicy) -> Result<DecodedSeries> {
    let mut reader = RecordReader::new(data);

    let version = reader.get_unsigned("encoding version")?;
    if version != ENCODING_VERSION {
        error!(
            "Data is not in the correct encoding: expected version {}, got {}",
            ENCODING_VERSION, version
        );
        return Err(SeriesError::EncodingVersionMismatch {
            expected: ENCODING_VERSION,
            actual: version,
        });
    }

    let key = reader.get_string("series key")?;
    let retention_secs = reader.get_unsigned("retention")?;
    let max_samples_per_chunk = reader.get_unsigned("max samples per chunk")?;
    let max_samples_per_chunk = usize::try_from(max_samples_per_chunk).map_err(|_| {
        SeriesError::InvalidFormat(format!("Chunk capacity {} out of range", max_samples_per_chunk))
    })?;

    let label_count = reader.get_unsigned("label count")?;
    let mut labels = Vec::new();
    for _ in 0..label_count {
        let label_key = reader.get_string("label key")?;
        let label_value = reader.get_string("label value")?;
        labels.push(Label::new(label_key, label_value));
    }

    let mut series = Series::new(key, labels, retention_secs, max_samples_per_chunk)
        .map_err(|e| SeriesError::InvalidFormat(e.to_string()))?;

    let rule_count = reader.get_unsigned("rule count")?;
    for _ in 0..rule_count {
        let dest_key = reader.get_string("rule destination")?;
        let bucket_secs = reader.get_unsigned("rule bucket size")?;
        let agg = AggregationType::try_from(reader.get_unsigned("rule aggregation")?)?;
        let mut rule = CompactionRule::decode(dest_key, bucket_secs, agg, &mut reader)?;
        if policy == ReplayPolicy::Propagate {
            rule.reset();
        }
        series
            .add_rule(rule)
            .map_err(|e| SeriesError::InvalidFormat(e.to_string()))?;
    }

    let sample_count = reader.get_unsigned("sample count")?;
    let mut report = LoadReport::default();
    let mut emissions = Vec::new();

    for index in 0..sample_count {
        let record = reader
            .get_unsigned("sample timestamp")
            .and_then(|ts| Ok((ts, reader.get_double("sample value")?)));
        let (timestamp, value) = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Sample section of {} truncated after {} of {} samples: {}",
                    series.key(),
                    index,
                    sample_count,
                    e
                );
                report.truncated = true;
                break;
            }
        };

        let replayed = match policy {
            ReplayPolicy::Suppress => series.append_sample(timestamp, value),
            ReplayPolicy::Propagate => series
                .add_sample(timestamp, value)
                .map(|emitted| emissions.extend(emitted)),
        };
        match replayed {
            Ok(()) => report.loaded_samples += 1,
            Err(e) => {
                let corrupt = SeriesError::CorruptSample {
                    timestamp,
                    reason: e.to_string(),
                };
                warn!("Couldn't load sample into {}: {}", series.key(), corrupt);
                report.skipped_samples.push(Sample::new(timestamp, value));
            }
        }
    }

    if !report.truncated && reader.remaining() > 0 {
        warn!(
            "Ignoring {} trailing bytes after record of {}",
            reader.remaining(),
            series.key()
        );
    }

    Ok(DecodedSeries {
        series,
        emissions,
        report,
    })
}
