use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Deepest split level a leaf id can encode (ids are `u64` paths).
pub const MAX_SUPPORTED_DEPTH: u32 = 62;

/// Shape parameters of a [`TdTree`](crate::TdTree).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Entry capacity of a leaf before it splits.
    pub block_size: usize,
    /// Upper timestamp bound of the indexed half-plane; also the stored end
    /// of open intervals.
    pub max_value: i64,
    /// Leaves at this depth stop splitting and spill into an overflow list.
    pub max_depth: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            max_value: 1 << 43,
            max_depth: 48,
        }
    }
}

impl IndexConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.block_size == 0 {
            return Err(IndexError::InvalidConfig("block_size must be at least 1".into()));
        }
        if self.max_value < 1 {
            return Err(IndexError::InvalidConfig(format!(
                "max_value must be positive, got {}",
                self.max_value
            )));
        }
        if self.max_depth == 0 || self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(IndexError::InvalidConfig(format!(
                "max_depth must be in 1..={MAX_SUPPORTED_DEPTH}, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}
