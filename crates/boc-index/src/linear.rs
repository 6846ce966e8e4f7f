use boc_types::ObjectHash;

use crate::entry::{Entry, Key};
use crate::error::IndexResult;
use crate::traits::TemporalIndex;

/// Unordered list of entries, scanned on every lookup.
///
/// Answers every query the same way [`TdTree`](crate::TdTree) does and is
/// used as the reference in agreement tests and benchmarks.
#[derive(Debug)]
pub struct LinearIndex<V> {
    entries: Vec<Entry<V>>,
    max_value: i64,
}

impl<V> LinearIndex<V> {
    pub fn new(max_value: i64) -> Self {
        Self {
            entries: Vec::new(),
            max_value,
        }
    }

    fn position(&self, pred: impl Fn(&Key) -> bool) -> Option<usize> {
        self.entries.iter().position(|e| pred(&e.key))
    }
}

impl<V> TemporalIndex<V> for LinearIndex<V> {
    fn insert_value(&mut self, object_key: &str, start: i64, end: i64, value: V) -> IndexResult<bool> {
        let key = Key::new(ObjectHash::of(object_key), start, end);
        if self.position(|k| *k == key).is_some() {
            return Ok(false);
        }
        self.entries.push(Entry::new(key, value));
        Ok(true)
    }

    fn get_value(&self, object_key: &str, at: i64) -> Option<&V> {
        let object = ObjectHash::of(object_key);
        self.entries
            .iter()
            .find(|e| e.key.matches(object, at))
            .map(|e| &e.value)
    }

    fn get_exact(&self, object_key: &str, start: i64, end: i64) -> Option<&V> {
        let key = Key::new(ObjectHash::of(object_key), start, end);
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    fn delete_value(&mut self, object_key: &str, at: i64) -> Option<V> {
        let object = ObjectHash::of(object_key);
        let pos = self.position(|k| k.matches(object, at))?;
        Some(self.entries.remove(pos).value)
    }

    fn delete_exact(&mut self, object_key: &str, start: i64, end: i64) -> Option<V> {
        let key = Key::new(ObjectHash::of(object_key), start, end);
        let pos = self.position(|k| *k == key)?;
        Some(self.entries.remove(pos).value)
    }

    fn rebuild_index(&mut self) -> IndexResult<()> {
        self.entries.shrink_to_fit();
        Ok(())
    }

    fn get_max_value(&self) -> i64 {
        self.max_value
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
