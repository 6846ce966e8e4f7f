//! The Temporal Decomposition Tree.
//!
//! Only the fringe of current leaves is stored, keyed by path id. Interior
//! (split) triangles are implicit: a path id missing from the map above the
//! deepest observed leaf is a routing node whose children are `2id` and
//! `2id + 1`.

use std::collections::HashMap;

use boc_types::ObjectHash;
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::entry::{Entry, Key};
use crate::error::{IndexError, IndexResult};
use crate::geometry::{intersects_stab, outside_distance, rounding_slack, Triangle};
use crate::leaf::{InsertResult, Leaf};
use crate::stats::IndexStatistics;
use crate::traits::TemporalIndex;

/// Triangle-split interval index.
///
/// Leaf selection walks the geometry from the root, stepping into the child
/// nearest the point at each depth, until it meets a current leaf. The walk never goes below
/// the deepest leaf seen so far.
pub struct TdTree<V> {
    config: IndexConfig,
    leaves: HashMap<u64, Leaf<V>>,
    max_depth: u32,
    len: usize,
}

impl<V> std::fmt::Debug for TdTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdTree")
            .field("leaves", &self.leaves.len())
            .field("entries", &self.len)
            .field("max_depth", &self.max_depth)
            .field("config", &self.config)
            .finish()
    }
}

impl<V> TdTree<V> {
    /// Create an empty tree holding a single root leaf.
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;
        let mut leaves = HashMap::new();
        leaves.insert(1, Leaf::root(&config));
        Ok(Self {
            config,
            leaves,
            max_depth: 1,
            len: 0,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Deepest current leaf.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Ids of the current leaves, ascending.
    pub fn leaf_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.leaves.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All live entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<V>> {
        self.leaves.values().flat_map(Leaf::entries)
    }

    fn max(&self) -> f64 {
        self.config.max_value as f64
    }

    /// The current leaf whose triangle holds the point `(x, y)`.
    fn locate(&self, x: f64, y: f64) -> Option<u64> {
        let max = self.max();
        let mut id = 1u64;
        let mut triangle = Triangle::root(max);
        while triangle.depth <= self.max_depth {
            if self.leaves.contains_key(&id) {
                return Some(id);
            }
            let (child, higher) = triangle.route(max, x, y);
            id = id * 2 + u64::from(higher);
            triangle = child;
        }
        None
    }

    fn locate_key(&self, key: &Key) -> IndexResult<u64> {
        let (x, y) = key.routing_point(self.config.max_value);
        self.locate(x, y).ok_or(IndexError::Uncovered {
            start: key.start,
            end: key.end,
        })
    }

    /// The first leaf, in lower-before-higher order, holding an entry for
    /// `object` that covers `at`.
    ///
    /// Only triangles that can contain a point `start <= at <= end` are
    /// visited.
    fn find_leaf(&self, object: ObjectHash, at: i64) -> Option<u64> {
        let max = self.max();
        let t = at.clamp(0, self.config.max_value) as f64;
        let slack = rounding_slack(max);
        let mut stack = vec![(1u64, Triangle::root(max))];

        while let Some((id, triangle)) = stack.pop() {
            if !intersects_stab(&triangle.vertices(max), t, slack) {
                continue;
            }
            if let Some(leaf) = self.leaves.get(&id) {
                if leaf.get(object, at).is_some() {
                    return Some(id);
                }
                continue;
            }
            if triangle.depth < self.max_depth {
                let (lower, higher) = triangle.children(max);
                stack.push((id * 2 + 1, higher));
                stack.push((id * 2, lower));
            }
        }
        None
    }

    /// Insert a pre-hashed entry. Returns `false` for an exact duplicate.
    pub fn insert_entry(&mut self, entry: Entry<V>) -> IndexResult<bool> {
        let key = entry.key;
        let id = self.locate_key(&key)?;
        let leaf = self
            .leaves
            .get_mut(&id)
            .ok_or(IndexError::Uncovered {
                start: key.start,
                end: key.end,
            })?;

        match leaf.insert(entry, &self.config) {
            InsertResult::Duplicate => Ok(false),
            InsertResult::Inserted => {
                self.len += 1;
                Ok(true)
            }
            InsertResult::Overflowed => {
                let spilled = leaf.overflow_len();
                if spilled == 1 {
                    warn!(
                        leaf = id,
                        depth = leaf.depth(),
                        start = key.start,
                        end = key.end,
                        "leaf at depth limit is full; spilling into overflow list"
                    );
                } else {
                    debug!(leaf = id, spilled, "overflow entry appended");
                }
                self.len += 1;
                Ok(true)
            }
            InsertResult::Split { replaced, leaves } => {
                self.absorb_split(replaced, leaves);
                self.len += 1;
                Ok(true)
            }
        }
    }

    fn absorb_split(&mut self, replaced: u64, leaves: Vec<Leaf<V>>) {
        self.leaves.remove(&replaced);
        let produced = leaves.len();
        for leaf in leaves {
            self.max_depth = self.max_depth.max(leaf.depth());
            self.leaves.insert(leaf.id(), leaf);
        }
        debug!(
            leaf = replaced,
            produced,
            max_depth = self.max_depth,
            "leaf split"
        );
    }

    pub fn get_hashed(&self, object: ObjectHash, at: i64) -> Option<&V> {
        let id = self.find_leaf(object, at)?;
        self.leaves.get(&id)?.get(object, at)
    }

    pub fn get_exact_key(&self, key: &Key) -> Option<&V> {
        let id = self.locate_key(key).ok()?;
        self.leaves.get(&id)?.get_exact(key)
    }

    pub fn delete_hashed(&mut self, object: ObjectHash, at: i64) -> Option<V> {
        let id = self.find_leaf(object, at)?;
        let removed = self.leaves.get_mut(&id)?.delete_at(object, at);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn delete_exact_key(&mut self, key: &Key) -> Option<V> {
        let id = self.locate_key(key).ok()?;
        let removed = self.leaves.get_mut(&id)?.delete_exact(key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Drain every live entry, reset to a single root leaf and re-insert.
    pub fn rebuild(&mut self) -> IndexResult<()> {
        let before = self.statistics_snapshot();
        let mut entries = Vec::with_capacity(self.len);
        for id in self.leaf_ids() {
            if let Some(mut leaf) = self.leaves.remove(&id) {
                entries.extend(leaf.drain());
            }
        }

        self.leaves.clear();
        self.leaves.insert(1, Leaf::root(&self.config));
        self.max_depth = 1;
        self.len = 0;

        for entry in entries {
            self.insert_entry(entry)?;
        }

        debug!(
            entries = self.len,
            leaves_before = before.leaf_count,
            leaves_after = self.leaves.len(),
            tombstones_dropped = before.tombstones,
            "index rebuilt"
        );
        Ok(())
    }

    pub fn statistics_snapshot(&self) -> IndexStatistics {
        let max = self.max();
        let slack = rounding_slack(max);
        let mut stats = IndexStatistics {
            leaf_count: self.leaves.len(),
            slot_capacity: self.leaves.len() * self.config.block_size,
            max_depth: self.max_depth,
            ..Default::default()
        };
        for leaf in self.leaves.values() {
            stats.live_entries += leaf.live();
            stats.tombstones += leaf.tombstones();
            stats.overflow_entries += leaf.overflow_len();

            let vertices = leaf.triangle().vertices(max);
            stats.stray_entries += leaf
                .entries()
                .filter(|e| {
                    let (x, y) = e.key.routing_point(self.config.max_value);
                    outside_distance(x, y, &vertices) > slack
                })
                .count();
        }
        if stats.stray_entries > 0 {
            warn!(stray = stats.stray_entries, "entries stored outside their leaf triangle");
        }
        stats.finish()
    }
}

impl<V> TemporalIndex<V> for TdTree<V> {
    fn insert_value(&mut self, object_key: &str, start: i64, end: i64, value: V) -> IndexResult<bool> {
        let key = Key::new(ObjectHash::of(object_key), start, end);
        self.insert_entry(Entry::new(key, value))
    }

    fn get_value(&self, object_key: &str, at: i64) -> Option<&V> {
        self.get_hashed(ObjectHash::of(object_key), at)
    }

    fn get_exact(&self, object_key: &str, start: i64, end: i64) -> Option<&V> {
        self.get_exact_key(&Key::new(ObjectHash::of(object_key), start, end))
    }

    fn delete_value(&mut self, object_key: &str, at: i64) -> Option<V> {
        self.delete_hashed(ObjectHash::of(object_key), at)
    }

    fn delete_exact(&mut self, object_key: &str, start: i64, end: i64) -> Option<V> {
        self.delete_exact_key(&Key::new(ObjectHash::of(object_key), start, end))
    }

    fn rebuild_index(&mut self) -> IndexResult<()> {
        self.rebuild()
    }

    fn get_max_value(&self) -> i64 {
        self.config.max_value
    }

    fn len(&self) -> usize {
        self.len
    }

    fn statistics(&self) -> IndexResult<IndexStatistics> {
        Ok(self.statistics_snapshot())
    }
}
