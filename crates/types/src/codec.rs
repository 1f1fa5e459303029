//! Fixed-format binary decoding helpers.
//!
//! Every serialized artifact in Chronicle has a bit-exact layout (big-endian
//! integers, raw 32-byte keys). This module provides the cursor used by the
//! header and directory codecs, with consistent error handling via snafu.

use snafu::Snafu;

use crate::key::{Key, KEY_LENGTH};

/// Error type for fixed-format decoding.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    /// The buffer ended before the expected field.
    #[snafu(display("buffer too short: needed {needed} bytes, got {got}"))]
    Truncated {
        /// Bytes required by the encoding.
        needed: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The buffer is longer than the encoding allows.
    #[snafu(display("trailing bytes: encoding is {expected} bytes, got {got}"))]
    TrailingBytes {
        /// Encoded size.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },
}

/// Byte cursor over a fixed-format buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len()).ok_or(
            DecodeError::Truncated {
                needed: self.pos.saturating_add(len),
                got: self.buf.len(),
            },
        )?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("take returned 4 bytes")))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("take returned 8 bytes")))
    }

    pub(crate) fn read_key(&mut self) -> Result<Key, DecodeError> {
        let bytes = self.take(KEY_LENGTH)?;
        Ok(bytes.try_into().expect("take returned 32 bytes"))
    }

    /// Asserts the buffer has been fully consumed.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes { expected: self.pos, got: self.buf.len() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_round_trip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x01020304u32.to_be_bytes());
        buf.extend_from_slice(&0x05060708090a0b0cu64.to_be_bytes());
        buf.push(0x0d);
        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_u32().unwrap(), 0x01020304);
        assert_eq!(reader.read_u64().unwrap(), 0x05060708090a0b0c);
        assert_eq!(reader.read_u8().unwrap(), 0x0d);
        reader.finish().unwrap();
    }

    #[test]
    fn test_reader_truncated() {
        let mut reader = Reader::new(&[0u8; 3]);
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 4, got: 3 }));
    }

    #[test]
    fn test_reader_trailing_bytes() {
        let mut reader = Reader::new(&[0u8; 5]);
        reader.read_u32().unwrap();
        let err = reader.finish().unwrap_err();
        assert!(matches!(err, DecodeError::TrailingBytes { expected: 4, got: 5 }));
    }

    #[test]
    fn test_reader_key() {
        let mut buf = vec![0xabu8; 32];
        buf.push(0x01);
        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_key().unwrap(), [0xabu8; 32]);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        reader.finish().unwrap();
    }
}
