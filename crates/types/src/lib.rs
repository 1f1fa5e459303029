//! Core types for the Chronicle ledger reporting service.
//!
//! This crate provides the foundational types shared by the storage backends:
//! - 256-bit keys and the sentinel values bracketing the key space
//! - Ledger headers with their fixed binary encoding
//! - Directory pages, ranges, transactions, and pagination cursors
//! - Error taxonomy using snafu
//! - Backend configuration

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod key;
pub mod ledger;

// Re-export commonly used types at crate root
pub use error::{BackendError, Result};
pub use key::{hex, Key, FIRST_KEY, KEY_LENGTH, LAST_KEY};
pub use ledger::*;
