//! A block-device-backed HTTP object cache.
//!
//! This crate implements a circular, log-structured cache on a raw (or raw-file)
//! volume: objects are ingested as byte ranges and served back from the underlying
//! block storage. A single writer per volume aggregates incoming fragments into
//! 4 MiB blocks and appends them to a circular data area; any number of concurrent
//! readers resolve byte ranges against an in-memory range index that is itself
//! durably checkpointed to two alternating on-disk copies.
//!
//! ## Layout
//!
//! - [`units`], [`range`], [`range_vector`]: the unit-safe integer types and the
//!   packed range descriptors that everything else is built from.
//! - [`volume`]: raw block I/O and on-disk layout.
//! - [`metadata`]: the durable fingerprint → range-vector table and its A/B header
//!   and footer.
//! - [`agg`]: the in-memory aggregation buffer and the writer state machine that
//!   drains it to disk.
//! - [`aio`]: the per-volume thread pool that dispatches blocking disk I/O.
//! - [`handles`]: the per-request read/write/open state machines.
//! - [`fs`]: one volume's top-level state, tying the above together.
//! - [`manager`]: the volume-sharded cache used by callers.

mod checksum;
mod key;

pub mod agg;
pub mod aio;
pub mod config;
pub mod error;
pub mod fs;
pub mod handles;
pub mod manager;
pub mod metadata;
pub mod ops;
pub mod range;
pub mod range_vector;
pub mod units;
pub mod volume;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::CacheError;
pub use fs::CacheFs;
pub use key::CacheKey;
pub use manager::CacheMgr;
