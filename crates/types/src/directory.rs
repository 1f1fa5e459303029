//! Directory pages and order-book bounds.
//!
//! A directory is a chain of pages, each listing the keys of the objects it
//! contains and linking to the next page. Book directories additionally share
//! a 24-byte base prefix; the low 8 bytes order pages by offer quality.
//!
//! Page encoding layout:
//! - entry count: 4 bytes (u32 BE)
//! - entries: count × 32 bytes
//! - next page key: 32 bytes (`FIRST_KEY` when the chain ends)

use crate::codec::{DecodeError, Reader};
use crate::key::{Key, FIRST_KEY, LAST_KEY};

/// Length of the book base prefix shared by all pages of one book.
pub const BOOK_BASE_LENGTH: usize = 24;

/// One page of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryPage {
    /// Keys of the objects contained in this page.
    pub entries: Vec<Key>,
    /// Key of the next page in the chain, if any.
    pub next: Option<Key>,
}

impl DirectoryPage {
    /// Serializes the page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.entries.len() * 32 + 32);
        buf.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(entry);
        }
        buf.extend_from_slice(&self.next.unwrap_or(FIRST_KEY));
        buf
    }

    /// Deserializes a page.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the buffer does not match the entry count.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(buf);
        let count = reader.read_u32()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(reader.read_key()?);
        }
        let next = reader.read_key()?;
        reader.finish()?;
        let next = if next == FIRST_KEY { None } else { Some(next) };
        Ok(Self { entries, next })
    }
}

/// First key past the book identified by `book`'s 24-byte base: the base
/// incremented by one, quality bytes zeroed. Directory keys at or beyond
/// this bound belong to a different book.
pub fn book_upper_bound(book: &Key) -> Key {
    let mut bound = *book;
    for byte in bound[BOOK_BASE_LENGTH..].iter_mut() {
        *byte = 0;
    }
    for byte in bound[..BOOK_BASE_LENGTH].iter_mut().rev() {
        let (incremented, overflow) = byte.overflowing_add(1);
        *byte = incremented;
        if !overflow {
            return bound;
        }
    }
    // Base was all 0xff; saturate at the end of the key space.
    LAST_KEY
}
