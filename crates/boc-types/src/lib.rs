//! Foundation types for the bitemporal object cache.
//!
//! The index, cache and CLI crates all build on `boc-types`.
//!
//! # Key Types
//!
//! - [`ObjectHash`] -- 64-bit deterministic hash of an external object key
//! - [`Interval`] -- half-open `[start, end)` span with an optional open end
//! - [`CacheIdentifier`] -- the identifier contract the cache is generic over
//! - [`VersionedId`] -- `object~version@db` identifier shipped with the cache

pub mod error;
pub mod hash;
pub mod identifier;
pub mod interval;

pub use error::TypeError;
pub use hash::ObjectHash;
pub use identifier::{CacheIdentifier, VersionedId};
pub use interval::Interval;
