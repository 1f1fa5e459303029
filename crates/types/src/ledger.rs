//! Ledger data model: headers, ranges, objects, transactions, cursors.
//!
//! The header codec is a fixed 150-byte big-endian encoding so that a header
//! round-trips as an opaque blob through the persistent store.
//!
//! Encoding layout:
//! - sequence: 4 bytes (u32 BE)
//! - total_coins: 8 bytes (u64 BE)
//! - parent_hash: 32 bytes
//! - tx_hash: 32 bytes
//! - account_hash: 32 bytes
//! - parent_close_time: 4 bytes (u32 BE)
//! - close_time: 4 bytes (u32 BE)
//! - close_time_resolution: 1 byte
//! - close_flags: 1 byte
//! - hash: 32 bytes
//!
//! Total: 150 bytes (fixed)

use crate::codec::{DecodeError, Reader};
use crate::key::Key;

/// Size of an encoded ledger header.
pub const HEADER_ENCODING_SIZE: usize = 150;

/// Header of a single committed ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerHeader {
    /// Dense, monotonic ledger sequence number.
    pub sequence: u32,
    /// Hash identifying this ledger.
    pub hash: Key,
    /// Hash of the preceding ledger.
    pub parent_hash: Key,
    /// Root hash over the transaction set.
    pub tx_hash: Key,
    /// Root hash over the state objects.
    pub account_hash: Key,
    /// Total coins in circulation.
    pub total_coins: u64,
    /// Close time of the parent ledger (ledger epoch seconds).
    pub parent_close_time: u32,
    /// Close time of this ledger (ledger epoch seconds).
    pub close_time: u32,
    /// Close time resolution in seconds.
    pub close_time_resolution: u8,
    /// Close flags.
    pub close_flags: u8,
}

impl LedgerHeader {
    /// Serializes the header to its fixed 150-byte encoding.
    pub fn to_bytes(&self) -> [u8; HEADER_ENCODING_SIZE] {
        let mut buf = [0u8; HEADER_ENCODING_SIZE];
        let mut offset = 0;

        buf[offset..offset + 4].copy_from_slice(&self.sequence.to_be_bytes());
        offset += 4;

        buf[offset..offset + 8].copy_from_slice(&self.total_coins.to_be_bytes());
        offset += 8;

        buf[offset..offset + 32].copy_from_slice(&self.parent_hash);
        offset += 32;

        buf[offset..offset + 32].copy_from_slice(&self.tx_hash);
        offset += 32;

        buf[offset..offset + 32].copy_from_slice(&self.account_hash);
        offset += 32;

        buf[offset..offset + 4].copy_from_slice(&self.parent_close_time.to_be_bytes());
        offset += 4;

        buf[offset..offset + 4].copy_from_slice(&self.close_time.to_be_bytes());
        offset += 4;

        buf[offset] = self.close_time_resolution;
        offset += 1;

        buf[offset] = self.close_flags;
        offset += 1;

        buf[offset..offset + 32].copy_from_slice(&self.hash);

        buf
    }

    /// Deserializes a header from its fixed encoding.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the buffer is not exactly 150 bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(buf);
        let sequence = reader.read_u32()?;
        let total_coins = reader.read_u64()?;
        let parent_hash = reader.read_key()?;
        let tx_hash = reader.read_key()?;
        let account_hash = reader.read_key()?;
        let parent_close_time = reader.read_u32()?;
        let close_time = reader.read_u32()?;
        let close_time_resolution = reader.read_u8()?;
        let close_flags = reader.read_u8()?;
        let hash = reader.read_key()?;
        reader.finish()?;

        Ok(Self {
            sequence,
            hash,
            parent_hash,
            tx_hash,
            account_hash,
            total_coins,
            parent_close_time,
            close_time,
            close_time_resolution,
            close_flags,
        })
    }
}

/// The contiguous interval of ledgers held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerRange {
    /// Oldest kept ledger sequence.
    pub min_sequence: u32,
    /// Newest complete ledger sequence.
    pub max_sequence: u32,
}

/// A state object: a key plus its serialized contents.
///
/// An empty blob is a tombstone marking the key absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerObject {
    /// Object key.
    pub key: Key,
    /// Serialized object contents; empty means deleted.
    pub blob: Vec<u8>,
}

/// One page of an ordered state iteration.
#[derive(Debug, Clone, Default)]
pub struct LedgerPage {
    /// Objects in ascending key order.
    pub objects: Vec<LedgerObject>,
    /// Key to resume from, present when the page filled up.
    pub cursor: Option<Key>,
}

/// Offers collected from an order book's directories.
#[derive(Debug, Clone, Default)]
pub struct BookOffersPage {
    /// Offer objects in book order, capped by the request limit.
    pub offers: Vec<LedgerObject>,
}

/// A transaction blob with its metadata and placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAndMetadata {
    /// Serialized transaction.
    pub transaction: Vec<u8>,
    /// Serialized transaction metadata.
    pub metadata: Vec<u8>,
    /// Sequence of the ledger containing the transaction.
    pub ledger_sequence: u32,
    /// Close time of the containing ledger.
    pub date: u64,
}

/// Position of a transaction within the account history, used as a
/// pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountTransactionsCursor {
    /// Ledger sequence of the row.
    pub ledger_sequence: u32,
    /// Index of the transaction within its ledger.
    pub transaction_index: u32,
}

/// A page of an account's transaction history.
#[derive(Debug, Clone, Default)]
pub struct AccountTransactions {
    /// Transactions in requested order.
    pub transactions: Vec<TransactionAndMetadata>,
    /// Cursor to resume from, present when the page filled up.
    pub cursor: Option<AccountTransactionsCursor>,
}

/// One row of the account-transactions index, emitted at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransactionsData {
    /// Account identifier blob.
    pub account: Vec<u8>,
    /// Ledger sequence of the transaction.
    pub ledger_sequence: u32,
    /// Index of the transaction within its ledger.
    pub transaction_index: u32,
    /// Transaction hash.
    pub hash: Key,
}

/// A successor-index row: at `sequence` and later (until superseded), the
/// smallest live key strictly greater than `key` is `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessorLink {
    /// Source key of the link.
    pub key: Key,
    /// Ledger sequence at which the link first becomes valid.
    pub sequence: u32,
    /// The next live key, or `LAST_KEY` at the end of the set.
    pub next: Key,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> LedgerHeader {
        LedgerHeader {
            sequence: 12_345,
            hash: [0x11; 32],
            parent_hash: [0x22; 32],
            tx_hash: [0x33; 32],
            account_hash: [0x44; 32],
            total_coins: 99_999_999_999,
            parent_close_time: 700_000_000,
            close_time: 700_000_010,
            close_time_resolution: 10,
            close_flags: 1,
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_ENCODING_SIZE);
        let decoded = LedgerHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_encoding_is_big_endian() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &12_345u32.to_be_bytes());
        assert_eq!(&bytes[118..150], &[0x11u8; 32]);
    }

    #[test]
    fn test_header_rejects_truncated_buffer() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert!(LedgerHeader::from_bytes(&bytes[..HEADER_ENCODING_SIZE - 1]).is_err());
    }

    #[test]
    fn test_header_rejects_trailing_bytes() {
        let header = sample_header();
        let mut bytes = header.to_bytes().to_vec();
        bytes.push(0);
        assert!(LedgerHeader::from_bytes(&bytes).is_err());
    }
}
