use std::sync::Arc;
use std::time::Duration;

use boc_index::{IndexStatistics, TdTree, TemporalIndex};
use boc_lock::{CancelToken, LockError, ReadGuard, UpgradableRwLock, WriteGuard};
use boc_types::{CacheIdentifier, Interval};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::metrics::{self, MetricsSink, NoopMetrics};
use crate::store::{Placement, Released, ValueStore};

/// Sizes and fragmentation of a cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub valid: IndexStatistics,
    pub db: IndexStatistics,
    /// Stored payloads, direct ones included.
    pub values: usize,
    /// Payloads stored with [`BitemporalCache::put_direct`].
    pub direct_values: usize,
}

/// Everything the cache lock protects.
struct CacheState<I, V, X> {
    valid: X,
    db: X,
    values: ValueStore<I, V>,
}

impl<I, V, X> CacheState<I, V, X>
where
    I: CacheIdentifier,
    X: TemporalIndex<I>,
{
    fn lookup(&self, id: &I, valid_at: i64, db_at: i64) -> Option<&V> {
        match self.valid.get_value(&id.object_part(), valid_at) {
            Some(version) => {
                let stored = self.db.get_value(&version.index_key(), db_at)?;
                self.values.get(stored)
            }
            None => self.values.get_direct(id),
        }
    }

    /// Whether `delete(id)` would remove anything.
    fn holds(&self, id: &I) -> bool {
        match self.values.entry(id) {
            None => false,
            Some(stored) => match stored.placement {
                None => true,
                Some(p) => {
                    let (start, end) = p.valid;
                    self.valid.get_exact(&id.object_part(), start, end) == Some(&id.without_db())
                }
            },
        }
    }

    fn unindex(&mut self, id: &I, released: &Released<V>) {
        let Some(p) = released.placement else {
            return;
        };
        let (db_start, db_end) = p.db;
        self.db
            .delete_exact(&id.without_db().index_key(), db_start, db_end);
        if released.last_valid_ref {
            let (start, end) = p.valid;
            self.valid.delete_exact(&id.object_part(), start, end);
        }
    }

    fn remove(&mut self, id: &I) -> bool {
        match self.values.remove(id) {
            Some(released) => {
                self.unindex(id, &released);
                true
            }
            None => false,
        }
    }
}

/// Point-in-time cache over valid time and database time.
///
/// `valid` maps an object to the version that was true at a given valid
/// time. `db` maps that version to the database-qualified identifier the
/// system believed at a given database time. Payloads live in a value store
/// keyed by the full identifier. All three sit behind one
/// [`UpgradableRwLock`].
///
/// Every blocking call observes the cache's [`CancelToken`]. Once cancelled,
/// acquisitions fail with [`LockError::Interrupted`] until the token is
/// reset.
pub struct BitemporalCache<I, V, X = TdTree<I>> {
    state: UpgradableRwLock<CacheState<I, V, X>>,
    cancel: CancelToken,
    metrics: Arc<dyn MetricsSink>,
}

impl<I, V> BitemporalCache<I, V>
where
    I: CacheIdentifier,
    V: Clone,
{
    /// A cache backed by two TD-Trees shaped by `config`.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        let index = config.index_config();
        Ok(Self::with_indices(
            TdTree::new(index.clone())?,
            TdTree::new(index)?,
            config.acquire_timeout(),
        ))
    }
}

impl<I, V, X> BitemporalCache<I, V, X>
where
    I: CacheIdentifier,
    V: Clone,
    X: TemporalIndex<I>,
{
    /// A cache over caller-supplied indices.
    pub fn with_indices(valid: X, db: X, acquire_timeout: Option<Duration>) -> Self {
        let state = CacheState {
            valid,
            db,
            values: ValueStore::new(),
        };
        Self {
            state: UpgradableRwLock::with_timeout(state, acquire_timeout),
            cancel: CancelToken::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle that aborts blocked and future lock acquisitions.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn lock_failed(&self, op: &'static str, err: LockError) -> CacheError {
        self.metrics.increment(metrics::CACHE_LOCK_FAILURE);
        warn!(op, error = %err, "cache lock acquisition failed");
        CacheError::Lock(err)
    }

    fn read(&self, op: &'static str) -> CacheResult<ReadGuard<'_, CacheState<I, V, X>>> {
        self.state
            .read_with(&self.cancel)
            .map_err(|e| self.lock_failed(op, e))
    }

    fn write(&self, op: &'static str) -> CacheResult<WriteGuard<'_, CacheState<I, V, X>>> {
        self.state
            .write_with(&self.cancel)
            .map_err(|e| self.lock_failed(op, e))
    }

    /// The payload of `id`'s object as valid at `valid_at` and known at
    /// `db_at`.
    ///
    /// When no version of the object is valid at `valid_at`, falls back to a
    /// payload stored directly under `id` by [`put_direct`](Self::put_direct).
    /// Lock failures read as a miss.
    pub fn get(&self, id: &I, valid_at: i64, db_at: i64) -> Option<V> {
        self.try_get(id, valid_at, db_at).unwrap_or(None)
    }

    /// Like [`get`](Self::get), reporting lock failures.
    pub fn try_get(&self, id: &I, valid_at: i64, db_at: i64) -> CacheResult<Option<V>> {
        let state = self.read("get")?;
        let found = state.lookup(id, valid_at, db_at).cloned();
        drop(state);

        self.metrics.increment(if found.is_some() {
            metrics::CACHE_HIT
        } else {
            metrics::CACHE_MISS
        });
        Ok(found)
    }

    /// Record `value` for `id` over a valid-time and a database-time
    /// interval. Open ends are stored as the index maximum.
    ///
    /// Writing an identifier again replaces its payload and intervals.
    pub fn put(&self, id: I, valid: Interval, db: Interval, value: V) -> CacheResult<()> {
        let mut guard = self.write("put")?;
        let state = &mut *guard;

        let valid = (valid.start, valid.end_or(state.valid.get_max_value()));
        let db = (db.start, db.end_or(state.db.get_max_value()));
        let object = id.object_part();
        let version = id.without_db();
        let version_key = version.index_key();

        if let Some(previous) = state.values.insert(id.clone(), value, Some(Placement { valid, db })) {
            state.unindex(&id, &previous);
        }
        state.valid.insert_value(&object, valid.0, valid.1, version)?;
        state.db.insert_value(&version_key, db.0, db.1, id.clone())?;
        drop(guard);

        self.metrics.increment(metrics::CACHE_PUT);
        debug!(id = ?id, valid_start = valid.0, valid_end = valid.1, db_start = db.0, db_end = db.1, "cache put");
        Ok(())
    }

    /// Store a payload reachable only through the direct-key fallback of
    /// [`get`](Self::get).
    pub fn put_direct(&self, id: I, value: V) -> CacheResult<()> {
        let mut guard = self.write("put_direct")?;
        let state = &mut *guard;
        if let Some(previous) = state.values.insert(id.clone(), value, None) {
            state.unindex(&id, &previous);
        }
        drop(guard);

        self.metrics.increment(metrics::CACHE_PUT);
        debug!(id = ?id, "cache put (direct)");
        Ok(())
    }

    /// Remove `id` from both indices and the value store.
    ///
    /// The presence check runs under a read permit which is then upgraded,
    /// so the entry removed is the one that was checked. If another reader
    /// is already upgrading, this call waits for a fresh write permit and
    /// checks again. Returns `false` if there was nothing to remove.
    pub fn delete(&self, id: &I) -> CacheResult<bool> {
        let guard = self.read("delete")?;
        if !guard.holds(id) {
            return Ok(false);
        }

        let mut guard = match guard.upgrade_with(&self.cancel) {
            Ok(guard) => guard,
            Err(LockError::UpgradeConflict) => {
                warn!(id = ?id, "upgrade conflict on delete; retrying with a write permit");
                let guard = self.write("delete")?;
                if !guard.holds(id) {
                    return Ok(false);
                }
                guard
            }
            Err(err) => return Err(self.lock_failed("delete", err)),
        };

        let removed = guard.remove(id);
        drop(guard);

        if removed {
            self.metrics.increment(metrics::CACHE_DELETE);
            debug!(id = ?id, "cache delete");
        }
        Ok(removed)
    }

    /// Close the open valid interval of `previous` at `closed_at`, once a
    /// successor version takes over from that instant.
    ///
    /// Returns `false` if `previous` has no indexed entry.
    pub fn supersede(&self, previous: &I, closed_at: i64) -> CacheResult<bool> {
        let mut guard = self.write("supersede")?;
        let state = &mut *guard;

        let Some(placement) = state.values.placement(previous) else {
            return Ok(false);
        };
        let object = previous.object_part();
        let (start, end) = placement.valid;
        if !state.valid.set_key_temporals(&object, start, end, start, closed_at)? {
            return Ok(false);
        }
        let moved = state.values.retarget_valid(&object, (start, end), (start, closed_at));
        drop(guard);

        debug!(id = ?previous, start, old_end = end, new_end = closed_at, moved, "valid interval closed");
        Ok(true)
    }

    /// Compact both indices, dropping tombstones.
    pub fn rebuild(&self) -> CacheResult<CacheStatistics> {
        let mut guard = self.write("rebuild")?;
        let state = &mut *guard;
        state.valid.rebuild_index()?;
        state.db.rebuild_index()?;
        let stats = Self::collect(state)?;
        drop(guard);

        debug!(
            valid_leaves = stats.valid.leaf_count,
            db_leaves = stats.db.leaf_count,
            "cache indices rebuilt"
        );
        self.record(&stats);
        Ok(stats)
    }

    pub fn statistics(&self) -> CacheResult<CacheStatistics> {
        let guard = self.read("statistics")?;
        let stats = Self::collect(&guard)?;
        drop(guard);
        self.record(&stats);
        Ok(stats)
    }

    fn collect(state: &CacheState<I, V, X>) -> CacheResult<CacheStatistics> {
        Ok(CacheStatistics {
            valid: state.valid.statistics()?,
            db: state.db.statistics()?,
            values: state.values.len(),
            direct_values: state.values.direct_len(),
        })
    }

    fn record(&self, stats: &CacheStatistics) {
        self.metrics
            .gauge(metrics::VALID_ENTRIES, stats.valid.live_entries as f64);
        self.metrics
            .gauge(metrics::DB_ENTRIES, stats.db.live_entries as f64);
        self.metrics
            .gauge(metrics::VALID_FRAGMENTATION, stats.valid.fragmentation);
        self.metrics
            .gauge(metrics::DB_FRAGMENTATION, stats.db.fragmentation);
    }

    /// Number of stored payloads.
    pub fn len(&self) -> CacheResult<usize> {
        Ok(self.read("len")?.values.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}
