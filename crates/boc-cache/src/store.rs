//! Identifier-keyed payload storage.

use std::collections::HashMap;

use boc_types::CacheIdentifier;

/// Where a payload was indexed: its stored valid-time and database-time keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub valid: (i64, i64),
    pub db: (i64, i64),
}

/// A payload and, for interval writes, where it was indexed.
#[derive(Clone, Debug)]
pub struct StoredValue<V> {
    pub value: V,
    pub placement: Option<Placement>,
}

/// A payload taken out of the store.
#[derive(Debug)]
pub struct Released<V> {
    pub value: V,
    pub placement: Option<Placement>,
    /// No other stored identifier shares this payload's valid-time key, so
    /// the valid-index entry can go.
    pub last_valid_ref: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ValidSlot {
    object: String,
    start: i64,
    end: i64,
}

impl ValidSlot {
    fn new(object: String, (start, end): (i64, i64)) -> Self {
        Self { object, start, end }
    }
}

/// Payloads keyed by full identifier.
///
/// Several database-qualified identifiers of one version share a single
/// valid-index entry; the store tracks who references each one.
#[derive(Debug)]
pub struct ValueStore<I, V> {
    values: HashMap<I, StoredValue<V>>,
    valid_refs: HashMap<ValidSlot, Vec<I>>,
}

impl<I: CacheIdentifier, V> ValueStore<I, V> {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            valid_refs: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Payloads reachable only by their identifier.
    pub fn direct_len(&self) -> usize {
        self.values.values().filter(|v| v.placement.is_none()).count()
    }

    pub fn entry(&self, id: &I) -> Option<&StoredValue<V>> {
        self.values.get(id)
    }

    pub fn get(&self, id: &I) -> Option<&V> {
        self.values.get(id).map(|s| &s.value)
    }

    /// The payload for `id` if it was stored without interval placement.
    pub fn get_direct(&self, id: &I) -> Option<&V> {
        self.values
            .get(id)
            .filter(|s| s.placement.is_none())
            .map(|s| &s.value)
    }

    pub fn placement(&self, id: &I) -> Option<Placement> {
        self.values.get(id).and_then(|s| s.placement)
    }

    /// Store a payload, returning the one it replaced.
    pub fn insert(&mut self, id: I, value: V, placement: Option<Placement>) -> Option<Released<V>> {
        let previous = self.remove(&id);
        if let Some(p) = placement {
            self.valid_refs
                .entry(ValidSlot::new(id.object_part(), p.valid))
                .or_default()
                .push(id.clone());
        }
        self.values.insert(id, StoredValue { value, placement });
        previous
    }

    pub fn remove(&mut self, id: &I) -> Option<Released<V>> {
        let stored = self.values.remove(id)?;
        let mut last_valid_ref = false;
        if let Some(p) = stored.placement {
            let slot = ValidSlot::new(id.object_part(), p.valid);
            if let Some(refs) = self.valid_refs.get_mut(&slot) {
                refs.retain(|r| r != id);
                if refs.is_empty() {
                    self.valid_refs.remove(&slot);
                    last_valid_ref = true;
                }
            }
        }
        Some(Released {
            value: stored.value,
            placement: stored.placement,
            last_valid_ref,
        })
    }

    /// Move every identifier referencing `object`'s valid key `from` to `to`.
    /// Returns how many were moved.
    pub fn retarget_valid(&mut self, object: &str, from: (i64, i64), to: (i64, i64)) -> usize {
        let Some(refs) = self
            .valid_refs
            .remove(&ValidSlot::new(object.to_string(), from))
        else {
            return 0;
        };
        for id in &refs {
            if let Some(p) = self.values.get_mut(id).and_then(|s| s.placement.as_mut()) {
                p.valid = to;
            }
        }
        let moved = refs.len();
        self.valid_refs
            .entry(ValidSlot::new(object.to_string(), to))
            .or_default()
            .extend(refs);
        moved
    }
}

impl<I: CacheIdentifier, V> Default for ValueStore<I, V> {
    fn default() -> Self {
        Self::new()
    }
}
