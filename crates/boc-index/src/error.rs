//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The index implementation does not provide this operation.
    #[error("unsupported operation for this index type: {0}")]
    Unsupported(&'static str),

    /// The index configuration is unusable.
    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),

    /// No current leaf covers a routing point.
    #[error("no leaf covers ({start}, {end}); leaf fringe is inconsistent")]
    Uncovered { start: i64, end: i64 },
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
