//! 256-bit keys identifying state objects, ledgers, and transactions.
//!
//! Keys are plain 32-byte arrays. Byte-wise lexicographic order is the
//! canonical key order; the all-zeros and all-ones values are reserved as
//! iteration sentinels and never identify a real object.

/// Length of a key in bytes.
pub const KEY_LENGTH: usize = 32;

/// A 256-bit key or hash.
pub type Key = [u8; KEY_LENGTH];

/// Sentinel preceding every real key; iteration starts here.
pub const FIRST_KEY: Key = [0x00; KEY_LENGTH];

/// Sentinel following every real key; a successor link pointing here
/// terminates iteration.
pub const LAST_KEY: Key = [0xff; KEY_LENGTH];

/// Converts a byte slice into a key. Returns `None` unless the slice is
/// exactly 32 bytes.
pub fn key_from_slice(bytes: &[u8]) -> Option<Key> {
    bytes.try_into().ok()
}

/// Hex-encodes bytes for diagnostics. Log output only; never parsed back.
pub fn hex(data: &[u8]) -> String {
    use std::fmt::Write;

    data.iter().fold(String::with_capacity(data.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_bracket_key_space() {
        let key: Key = [0x42; 32];
        assert!(FIRST_KEY < key);
        assert!(key < LAST_KEY);
    }

    #[test]
    fn test_key_from_slice_rejects_wrong_length() {
        assert!(key_from_slice(&[0u8; 31]).is_none());
        assert!(key_from_slice(&[0u8; 33]).is_none());
        assert_eq!(key_from_slice(&[7u8; 32]), Some([7u8; 32]));
    }

    #[test]
    fn test_hex_encoding() {
        assert_eq!(hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(hex(&[]), "");
    }
}
