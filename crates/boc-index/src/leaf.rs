//! Fixed-capacity index blocks.

use boc_types::ObjectHash;

use crate::config::IndexConfig;
use crate::entry::{Entry, Key};
use crate::geometry::{depth_of, routes_lower, Triangle};

/// Outcome of [`Leaf::insert`].
#[derive(Debug)]
pub enum InsertResult<V> {
    /// The entry was stored in this leaf.
    Inserted,
    /// An identical key was already present; nothing changed.
    Duplicate,
    /// The leaf is at the depth limit and full; the entry went to its
    /// overflow list.
    Overflowed,
    /// The leaf overflowed and was emptied. `leaves` is the new fringe that
    /// replaces leaf `replaced`, including any grandchildren produced while
    /// redistributing.
    Split { replaced: u64, leaves: Vec<Leaf<V>> },
}

/// A block of up to `block_size` entries covering one triangle of the
/// interval half-plane.
///
/// Slots are append-only until the leaf splits; deletes leave a tombstone
/// (`None`) that is reclaimed by the next split or an index rebuild.
#[derive(Debug)]
pub struct Leaf<V> {
    id: u64,
    apex: (f64, f64),
    direction: u8,
    slots: Vec<Option<Entry<V>>>,
    overflow: Vec<Entry<V>>,
}

impl<V> Leaf<V> {
    /// The root leaf (id 1) covering the whole half-plane.
    pub fn root(config: &IndexConfig) -> Self {
        Self::from_triangle(1, Triangle::root(config.max_value as f64), config.block_size)
    }

    fn from_triangle(id: u64, triangle: Triangle, capacity: usize) -> Self {
        debug_assert_eq!(depth_of(id), triangle.depth);
        Self {
            id,
            apex: triangle.apex,
            direction: triangle.direction,
            slots: Vec::with_capacity(capacity),
            overflow: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn depth(&self) -> u32 {
        depth_of(self.id)
    }

    pub fn triangle(&self) -> Triangle {
        Triangle {
            depth: self.depth(),
            apex: self.apex,
            direction: self.direction,
        }
    }

    /// Live entries, overflow included.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() + self.overflow.len()
    }

    /// Allocated slots that hold a deleted entry.
    pub fn tombstones(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Allocated slots, live or deleted.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Iterate over live entries in scan order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<V>> {
        self.slots.iter().flatten().chain(self.overflow.iter())
    }

    /// First entry for `object` whose interval covers `at`.
    pub fn get(&self, object: ObjectHash, at: i64) -> Option<&V> {
        self.entries()
            .find(|e| e.key.matches(object, at))
            .map(|e| &e.value)
    }

    pub fn get_exact(&self, key: &Key) -> Option<&V> {
        self.entries().find(|e| e.key == *key).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.get_exact(key).is_some()
    }

    /// Store an entry, splitting this leaf if it is full.
    ///
    /// Exact-duplicate keys are ignored. After a split this leaf is empty and
    /// must be replaced by the returned leaves.
    pub fn insert(&mut self, entry: Entry<V>, config: &IndexConfig) -> InsertResult<V> {
        if self.contains_key(&entry.key) {
            return InsertResult::Duplicate;
        }

        if self.slots.len() < config.block_size {
            self.slots.push(Some(entry));
            return InsertResult::Inserted;
        }

        if self.depth() >= config.max_depth {
            if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
                *slot = Some(entry);
                return InsertResult::Inserted;
            }
            self.overflow.push(entry);
            return InsertResult::Overflowed;
        }

        let mut entries = self.drain();
        entries.push(entry);
        let leaves = distribute(self.id, self.triangle(), entries, config);
        InsertResult::Split {
            replaced: self.id,
            leaves,
        }
    }

    /// Tombstone the first entry for `object` covering `at`.
    pub fn delete_at(&mut self, object: ObjectHash, at: i64) -> Option<V> {
        self.delete_first(|key| key.matches(object, at))
    }

    /// Tombstone the entry with exactly this key.
    pub fn delete_exact(&mut self, key: &Key) -> Option<V> {
        self.delete_first(|k| k == key)
    }

    fn delete_first(&mut self, mut pred: impl FnMut(&Key) -> bool) -> Option<V> {
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| pred(&e.key)) {
                return slot.take().map(|e| e.value);
            }
        }
        let pos = self.overflow.iter().position(|e| pred(&e.key))?;
        Some(self.overflow.remove(pos).value)
    }

    /// Remove and return every live entry, leaving the leaf empty.
    pub fn drain(&mut self) -> Vec<Entry<V>> {
        let mut out: Vec<Entry<V>> = self.slots.drain(..).flatten().collect();
        out.append(&mut self.overflow);
        out
    }
}

/// Split triangle `id` into its two children and spread `entries` over them,
/// recursing into any child that would itself overflow.
fn distribute<V>(id: u64, triangle: Triangle, entries: Vec<Entry<V>>, config: &IndexConfig) -> Vec<Leaf<V>> {
    let max = config.max_value as f64;
    let (lower_tri, higher_tri) = triangle.children(max);
    let lower_vertices = lower_tri.vertices(max);
    let higher_vertices = higher_tri.vertices(max);

    let (lower, higher): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| {
        let (x, y) = e.key.routing_point(config.max_value);
        routes_lower(x, y, &lower_vertices, &higher_vertices)
    });

    let mut out = fill(id * 2, lower_tri, lower, config);
    out.extend(fill(id * 2 + 1, higher_tri, higher, config));
    out
}

fn fill<V>(id: u64, triangle: Triangle, entries: Vec<Entry<V>>, config: &IndexConfig) -> Vec<Leaf<V>> {
    if entries.len() > config.block_size && triangle.depth < config.max_depth {
        return distribute(id, triangle, entries, config);
    }

    let mut leaf = Leaf::from_triangle(id, triangle, config.block_size);
    for entry in entries {
        if leaf.slots.len() < config.block_size {
            leaf.slots.push(Some(entry));
        } else {
            leaf.overflow.push(entry);
        }
    }
    vec![leaf]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(block_size: usize) -> IndexConfig {
        IndexConfig::default()
            .with_block_size(block_size)
            .with_max_value(1 << 20)
    }

    fn entry(object: u64, start: i64, end: i64, value: &str) -> Entry<String> {
        Entry::new(Key::new(ObjectHash::from_raw(object), start, end), value.to_string())
    }

    #[test]
    fn insert_and_get() {
        let cfg = config(4);
        let mut leaf = Leaf::root(&cfg);
        assert!(matches!(leaf.insert(entry(1, 10, 20, "a"), &cfg), InsertResult::Inserted));
        assert_eq!(leaf.get(ObjectHash::from_raw(1), 15), Some(&"a".to_string()));
        assert_eq!(leaf.get(ObjectHash::from_raw(1), 20), None);
        assert_eq!(leaf.get(ObjectHash::from_raw(2), 15), None);
    }

    #[test]
    fn duplicate_key_is_ignored() {
        let cfg = config(4);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 10, 20, "a"), &cfg);
        assert!(matches!(leaf.insert(entry(1, 10, 20, "b"), &cfg), InsertResult::Duplicate));
        assert_eq!(leaf.live(), 1);
        assert_eq!(leaf.get(ObjectHash::from_raw(1), 10), Some(&"a".to_string()));
    }

    #[test]
    fn split_keeps_every_entry_once() {
        let cfg = config(4);
        let mut leaf = Leaf::root(&cfg);
        for i in 0..4 {
            leaf.insert(entry(1, i * 100, i * 100 + 50, &format!("v{i}")), &cfg);
        }
        let result = leaf.insert(entry(1, 900, 950, "v9"), &cfg);
        let InsertResult::Split { replaced, leaves } = result else {
            panic!("expected a split");
        };
        assert_eq!(replaced, 1);
        assert_eq!(leaf.live(), 0);
        assert_eq!(leaves.iter().map(Leaf::live).sum::<usize>(), 5);
        for l in &leaves {
            assert!(l.id() >= 2);
            assert!(l.live() <= cfg.block_size);
        }

        for (start, value) in [(0, "v0"), (100, "v1"), (200, "v2"), (300, "v3"), (900, "v9")] {
            let hits: Vec<_> = leaves
                .iter()
                .filter_map(|l| l.get(ObjectHash::from_raw(1), start + 10))
                .collect();
            assert_eq!(hits, vec![&value.to_string()]);
        }
    }

    #[test]
    fn split_children_hold_only_their_own_points() {
        let cfg = config(2);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 1, 2, "a"), &cfg);
        leaf.insert(entry(1, 3, 4, "b"), &cfg);
        let InsertResult::Split { leaves, .. } = leaf.insert(entry(2, 1_000_000, 1_000_001, "c"), &cfg)
        else {
            panic!("expected a split");
        };
        let max = cfg.max_value as f64;
        for l in &leaves {
            for e in l.entries() {
                let (x, y) = e.key.routing_point(cfg.max_value);
                assert!(l.triangle().contains(max, x, y));
            }
        }
    }

    #[test]
    fn split_keeps_corner_points_inside_their_leaves() {
        use crate::geometry::{outside_distance, rounding_slack};

        let cfg = config(1).with_max_depth(40);
        let max = cfg.max_value;
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 0, max, "apex"), &cfg);
        let InsertResult::Split { leaves, .. } = leaf.insert(entry(2, 0, 0, "origin"), &cfg) else {
            panic!("expected a split");
        };
        let slack = rounding_slack(max as f64);
        for l in &leaves {
            let vertices = l.triangle().vertices(max as f64);
            for e in l.entries() {
                let (x, y) = e.key.routing_point(max);
                assert!(outside_distance(x, y, &vertices) <= slack, "{} strays from leaf {}", e.value, l.id());
            }
        }
        assert_eq!(leaves.iter().map(Leaf::live).sum::<usize>(), 2);
    }

    #[test]
    fn delete_leaves_a_tombstone() {
        let cfg = config(4);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 0, 10, "a"), &cfg);
        leaf.insert(entry(1, 10, 20, "b"), &cfg);
        assert_eq!(leaf.delete_at(ObjectHash::from_raw(1), 5), Some("a".to_string()));
        assert_eq!(leaf.tombstones(), 1);
        assert_eq!(leaf.slot_count(), 2);
        assert_eq!(leaf.live(), 1);
        assert_eq!(leaf.get(ObjectHash::from_raw(1), 5), None);

        let key = Key::new(ObjectHash::from_raw(1), 10, 20);
        assert_eq!(leaf.delete_exact(&key), Some("b".to_string()));
        assert_eq!(leaf.delete_exact(&key), None);
        assert_eq!(leaf.tombstones(), 2);
    }

    #[test]
    fn full_leaf_at_depth_limit_overflows() {
        let cfg = config(2).with_max_depth(1);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 0, 1, "a"), &cfg);
        leaf.insert(entry(1, 1, 2, "b"), &cfg);
        assert!(matches!(leaf.insert(entry(1, 2, 3, "c"), &cfg), InsertResult::Overflowed));
        assert_eq!(leaf.overflow_len(), 1);
        assert_eq!(leaf.get(ObjectHash::from_raw(1), 2), Some(&"c".to_string()));

        // A tombstone is reused before spilling further.
        leaf.delete_at(ObjectHash::from_raw(1), 0);
        assert!(matches!(leaf.insert(entry(1, 3, 4, "d"), &cfg), InsertResult::Inserted));
        assert_eq!(leaf.tombstones(), 0);
    }

    #[test]
    fn identical_points_stop_at_depth_limit() {
        let cfg = config(1).with_max_depth(6);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 500, 600, "a"), &cfg);
        let InsertResult::Split { leaves, .. } = leaf.insert(entry(2, 500, 600, "b"), &cfg) else {
            panic!("expected a split");
        };
        assert!(leaves.iter().all(|l| l.depth() <= 6));
        assert_eq!(leaves.iter().map(Leaf::live).sum::<usize>(), 2);
        assert_eq!(leaves.iter().map(Leaf::overflow_len).sum::<usize>(), 1);
    }

    #[test]
    fn drain_empties_the_leaf() {
        let cfg = config(4);
        let mut leaf = Leaf::root(&cfg);
        leaf.insert(entry(1, 0, 1, "a"), &cfg);
        leaf.insert(entry(1, 1, 2, "b"), &cfg);
        leaf.delete_at(ObjectHash::from_raw(1), 0);
        let drained = leaf.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(leaf.slot_count(), 0);
    }
}
