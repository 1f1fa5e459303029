//! Storage and read-path core for the Chronicle ledger reporting service.
//!
//! This crate provides:
//! - A versioned in-memory state cache with an ordered successor index
//! - The successor-link model applied to per-ledger diffs
//! - The `BackendInterface` capability set gluing the cache in front of a
//!   pluggable persistent store
//! - A Cassandra backend (schema, prepared statements, bounded-concurrency
//!   async write pipeline, synchronous reads, online retention)
//! - An in-memory backend with identical semantics for tests and embedding

#![deny(unsafe_code)]

pub mod cache;
pub mod cassandra;
pub mod interface;
pub mod memory;
pub mod pipeline;
pub mod successor;

pub use cache::{AppliedDiff, StateCache};
pub use cassandra::CassandraBackend;
pub use interface::{BackendCore, BackendInterface};
pub use memory::MemoryBackend;
pub use pipeline::WriteThrottle;
pub use successor::successor_updates;
