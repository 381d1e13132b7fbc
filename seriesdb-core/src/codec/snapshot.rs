//! Multi-series snapshots
//!
//! Format:
//! - 4 bytes: magic `SDBS`
//! - unsigned: snapshot version
//! - unsigned: series count
//! - per series: unsigned record length, then the series record

use super::{decode_series, encode_series, DecodedSeries, RecordReader, RecordWriter, ReplayPolicy};
use crate::config::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::series::Series;
use crate::{Result, SeriesError};
use bytes::Bytes;

/// Frame a set of series into one snapshot
pub fn encode_snapshot<'a, I>(series: I) -> Bytes
where
    I: IntoIterator<Item = &'a Series>,
{
    let records: Vec<Bytes> = series.into_iter().map(encode_series).collect();
    let total: usize = records.iter().map(|r| r.len() + 8).sum();

    let mut writer = RecordWriter::with_capacity(total + 20);
    writer.put_raw(SNAPSHOT_MAGIC);
    writer.put_unsigned(SNAPSHOT_VERSION);
    writer.put_unsigned(records.len() as u64);
    for record in &records {
        writer.put_unsigned(record.len() as u64);
        writer.put_raw(record);
    }
    writer.finish()
}

/// Decode every record of a snapshot.
///
/// Any framing error or record-level fatal error fails the whole snapshot.
pub fn decode_snapshot(data: &[u8], policy: ReplayPolicy) -> Result<Vec<DecodedSeries>> {
    let mut reader = RecordReader::new(data);

    let magic = reader.get_raw(SNAPSHOT_MAGIC.len(), "snapshot magic")?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SeriesError::InvalidFormat("Not a SeriesDB snapshot".into()));
    }

    let version = reader.get_unsigned("snapshot version")?;
    if version != SNAPSHOT_VERSION {
        return Err(SeriesError::EncodingVersionMismatch {
            expected: SNAPSHOT_VERSION,
            actual: version,
        });
    }

    let count = reader.get_unsigned("series count")?;
    let mut decoded = Vec::new();
    for _ in 0..count {
        let len = reader.get_unsigned("record length")?;
        let len = usize::try_from(len)
            .map_err(|_| SeriesError::InvalidFormat(format!("Record length {} too large", len)))?;
        let record = reader.get_raw(len, "series record")?;
        decoded.push(decode_series(record, policy)?);
    }

    if reader.remaining() > 0 {
        return Err(SeriesError::InvalidFormat(format!(
            "{} trailing bytes after last record",
            reader.remaining()
        )));
    }

    Ok(decoded)
}
