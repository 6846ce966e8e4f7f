use crate::error::{IndexError, IndexResult};
use crate::stats::IndexStatistics;

/// An index from `(object key, interval)` to a value.
///
/// Object keys are hashed to 64 bits before storage; keys whose hashes
/// collide are indistinguishable. Implementations must satisfy:
/// - `get_value(k, t)` finds an entry inserted as `(k, start, end)` iff
///   `start <= t < end`, or `start == end == t`.
/// - Inserting an exact-duplicate `(k, start, end)` is a no-op.
/// - Intervals for one object must not overlap; if they do, which match is
///   returned is unspecified.
/// - Lookups never reorganise the index.
pub trait TemporalIndex<V> {
    /// Insert a value. Returns `false` if the exact key was already present.
    fn insert_value(&mut self, object_key: &str, start: i64, end: i64, value: V) -> IndexResult<bool>;

    /// The value whose interval for `object_key` covers `at`.
    fn get_value(&self, object_key: &str, at: i64) -> Option<&V>;

    /// The value stored under exactly this key.
    fn get_exact(&self, object_key: &str, start: i64, end: i64) -> Option<&V>;

    /// Remove the value whose interval for `object_key` covers `at`.
    fn delete_value(&mut self, object_key: &str, at: i64) -> Option<V>;

    /// Remove the value stored under exactly this key.
    fn delete_exact(&mut self, object_key: &str, start: i64, end: i64) -> Option<V>;

    /// Move an entry to a new interval, keeping its value.
    ///
    /// Used to close an open interval once a successor version exists.
    /// Returns `false` if no entry had the old key.
    fn set_key_temporals(
        &mut self,
        object_key: &str,
        old_start: i64,
        old_end: i64,
        new_start: i64,
        new_end: i64,
    ) -> IndexResult<bool> {
        match self.delete_exact(object_key, old_start, old_end) {
            Some(value) => {
                self.insert_value(object_key, new_start, new_end, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the value stored under a key, returning the previous one.
    fn replace_key_value(&mut self, object_key: &str, start: i64, end: i64, value: V) -> IndexResult<Option<V>> {
        let previous = self.delete_exact(object_key, start, end);
        self.insert_value(object_key, start, end, value)?;
        Ok(previous)
    }

    /// Compact the index: drop tombstones and rebalance.
    fn rebuild_index(&mut self) -> IndexResult<()>;

    /// Timestamp used as the stored end of open intervals.
    fn get_max_value(&self) -> i64;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy statistics, if the implementation tracks them.
    fn statistics(&self) -> IndexResult<IndexStatistics> {
        Err(IndexError::Unsupported("statistics"))
    }
}
