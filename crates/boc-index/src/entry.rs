//! Keys and entries stored in index leaves.

use boc_types::ObjectHash;
use serde::{Deserialize, Serialize};

/// Index key: an object hash plus a half-open interval `[start, end)`.
///
/// `start == end` denotes a single instant. Keys are compared exactly; two
/// keys for the same object are expected not to overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub object: ObjectHash,
    pub start: i64,
    pub end: i64,
}

impl Key {
    pub fn new(object: ObjectHash, start: i64, end: i64) -> Self {
        Self { object, start, end }
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if the interval covers `at`.
    pub fn covers(&self, at: i64) -> bool {
        (self.start <= at && at < self.end) || (self.start == at && self.end == at)
    }

    /// Returns `true` if this key belongs to `object` and covers `at`.
    pub fn matches(&self, object: ObjectHash, at: i64) -> bool {
        self.object == object && self.covers(at)
    }

    /// The key's position in the half-plane, clamped to `[0, max_value]`.
    pub fn routing_point(&self, max_value: i64) -> (f64, f64) {
        (
            self.start.clamp(0, max_value) as f64,
            self.end.clamp(0, max_value) as f64,
        )
    }
}

/// A key and its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<V> {
    pub key: Key,
    pub value: V,
}

impl<V> Entry<V> {
    pub fn new(key: Key, value: V) -> Self {
        Self { key, value }
    }
}
