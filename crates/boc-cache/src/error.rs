use boc_index::IndexError;
use boc_lock::LockError;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A permit could not be acquired (cancelled or timed out).
    #[error("lock acquisition failed: {0}")]
    Lock(#[from] LockError),

    /// The underlying index rejected the operation.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
