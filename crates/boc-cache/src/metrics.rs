//! Fire-and-forget metrics hooks.

use std::collections::HashMap;
use std::sync::Mutex;

pub const CACHE_HIT: &str = "cache.hit";
pub const CACHE_MISS: &str = "cache.miss";
pub const CACHE_PUT: &str = "cache.put";
pub const CACHE_DELETE: &str = "cache.delete";
pub const CACHE_LOCK_FAILURE: &str = "cache.lock_failure";

pub const VALID_ENTRIES: &str = "index.valid.entries";
pub const DB_ENTRIES: &str = "index.db.entries";
pub const VALID_FRAGMENTATION: &str = "index.valid.fragmentation";
pub const DB_FRAGMENTATION: &str = "index.db.fragmentation";

/// Receiver for cache counters and gauges.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str);

    fn gauge(&self, name: &'static str, value: f64);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str) {}

    fn gauge(&self, _name: &'static str, _value: f64) {}
}

/// Keeps counters and the last value of each gauge in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<&'static str, u64>>,
    gauges: Mutex<HashMap<&'static str, f64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .expect("lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.lock().expect("lock poisoned").get(name).copied()
    }

    /// All counters, sorted by name.
    pub fn counters(&self) -> Vec<(&'static str, u64)> {
        let map = self.counters.lock().expect("lock poisoned");
        let mut out: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        out.sort_unstable_by_key(|(k, _)| *k);
        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &'static str) {
        *self
            .counters
            .lock()
            .expect("lock poisoned")
            .entry(name)
            .or_insert(0) += 1;
    }

    fn gauge(&self, name: &'static str, value: f64) {
        self.gauges.lock().expect("lock poisoned").insert(name, value);
    }
}
