//! Field-level encoding shared by series records and snapshots
//!
//! Format:
//! - unsigned: 8 bytes, little-endian
//! - double: 8 bytes, IEEE-754 bits, little-endian
//! - string: unsigned byte length, then UTF-8 bytes

use crate::{Result, SeriesError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Writes record fields into a growable buffer
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: BytesMut,
}

impl RecordWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_unsigned(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn put_double(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_unsigned(value as u64);
    }

    pub fn put_string(&mut self, value: &str) {
        self.put_unsigned(value.len() as u64);
        self.buf.put_slice(value.as_bytes());
    }

    /// Append raw bytes without a length prefix
    pub fn put_raw(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing and return the buffer
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads record fields, failing with `InvalidFormat` on truncation
#[derive(Debug)]
pub struct RecordReader<'a> {
    buf: &'a [u8],
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn get_unsigned(&mut self, field: &str) -> Result<u64> {
        self.ensure(8, field)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_double(&mut self, field: &str) -> Result<f64> {
        self.ensure(8, field)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn get_bool(&mut self, field: &str) -> Result<bool> {
        match self.get_unsigned(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SeriesError::InvalidFormat(format!(
                "Invalid flag {} for {}",
                other, field
            ))),
        }
    }

    pub fn get_string(&mut self, field: &str) -> Result<String> {
        let len = self.get_unsigned(field)?;
        let len = usize::try_from(len)
            .map_err(|_| SeriesError::InvalidFormat(format!("Length {} too large for {}", len, field)))?;
        let bytes = self.get_raw(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SeriesError::InvalidFormat(format!("{} is not UTF-8: {}", field, e)))
    }

    /// Take `len` raw bytes
    pub fn get_raw(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        self.ensure(len, field)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, len: usize, field: &str) -> Result<()> {
        if self.buf.len() < len {
            return Err(SeriesError::InvalidFormat(format!(
                "Unexpected end of data reading {}: need {} bytes, have {}",
                field,
                len,
                self.buf.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        let mut writer = RecordWriter::new();
        writer.put_unsigned(7);
        writer.put_string("ab");
        writer.put_double(1.5);
        let bytes = writer.finish();

        assert_eq!(bytes.len(), 8 + 8 + 2 + 8);
        assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_le_bytes());
        assert_eq!(&bytes[16..18], b"ab");
        assert_eq!(&bytes[18..26], &1.5f64.to_le_bytes());
    }

    #[test]
    fn test_reader_truncation() {
        let mut writer = RecordWriter::new();
        writer.put_string("hello");
        let bytes = writer.finish();

        let mut reader = RecordReader::new(&bytes[..10]);
        let err = reader.get_string("key").unwrap_err();
        assert!(matches!(err, SeriesError::InvalidFormat(_)));
    }

    #[test]
    fn test_reader_rejects_bad_flag() {
        let mut writer = RecordWriter::new();
        writer.put_unsigned(2);
        let bytes = writer.finish();

        let mut reader = RecordReader::new(&bytes);
        assert!(reader.get_bool("flag").is_err());
    }
}
