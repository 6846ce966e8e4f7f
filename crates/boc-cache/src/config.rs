use std::path::Path;
use std::time::Duration;

use boc_index::IndexConfig;
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;

/// Cache settings, loadable from TOML. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Leaf capacity of both indices.
    pub block_size: usize,
    /// Largest timestamp (ms) the indices cover; stored end of open intervals.
    pub max_value: i64,
    /// Depth at which leaves stop splitting.
    pub max_depth: u32,
    /// Bound on lock waits. `None` waits until granted or cancelled.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let index = IndexConfig::default();
        Self {
            block_size: index.block_size,
            max_value: index.max_value,
            max_depth: index.max_depth,
            acquire_timeout_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(s: &str) -> CacheResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            block_size: self.block_size,
            max_value: self.max_value,
            max_depth: self.max_depth,
        }
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}
