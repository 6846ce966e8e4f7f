//! Bitemporal object cache.
//!
//! Answers "what was the value of object X at valid time V, as known to the
//! system at database time T" from two [`TdTree`](boc_index::TdTree)
//! indices and a value store, all guarded by one upgradable lock.
//!
//! # Key Types
//!
//! - [`BitemporalCache`] -- the cache
//! - [`CacheConfig`] -- index shape and lock timeout, loadable from TOML
//! - [`CacheStatistics`] -- per-index occupancy and value count
//! - [`MetricsSink`] -- counters and gauges emitted by the cache
//! - [`ValueStore`] -- identifier-keyed payload storage

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod store;

pub use cache::{BitemporalCache, CacheStatistics};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use store::{Placement, Released, StoredValue, ValueStore};
