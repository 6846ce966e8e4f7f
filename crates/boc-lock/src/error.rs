use std::time::Duration;

/// Errors from lock acquisition.
///
/// Every variant means the permit was *not* granted and the protected data
/// was not touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The caller's cancel token fired while waiting.
    #[error("lock acquisition interrupted")]
    Interrupted,

    /// The configured acquire timeout elapsed.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// Another reader is already upgrading; this reader's permit was released.
    #[error("another reader is already upgrading to a write permit")]
    UpgradeConflict,
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
