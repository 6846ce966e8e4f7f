use serde::{Deserialize, Serialize};

/// Occupancy snapshot of an index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Current (non-split) leaves.
    pub leaf_count: usize,
    /// Live entries, overflow included.
    pub live_entries: usize,
    /// Deleted-but-not-compacted slots.
    pub tombstones: usize,
    /// Entries held in overflow lists of leaves at the depth limit.
    pub overflow_entries: usize,
    /// Total slot capacity of the current leaves.
    pub slot_capacity: usize,
    /// Live entries whose interval point lies outside their leaf's
    /// triangle. Always zero for a consistent index.
    pub stray_entries: usize,
    /// Deepest leaf in the fringe.
    pub max_depth: u32,
    /// `tombstones / slot_capacity`, in `[0, 1]`.
    pub fragmentation: f64,
}

impl IndexStatistics {
    pub(crate) fn finish(mut self) -> Self {
        self.fragmentation = if self.slot_capacity == 0 {
            0.0
        } else {
            self.tombstones as f64 / self.slot_capacity as f64
        };
        self
    }

    /// Fragmentation as a percentage.
    pub fn fragmentation_percent(&self) -> f64 {
        self.fragmentation * 100.0
    }
}
