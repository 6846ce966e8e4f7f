use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for blocked lock acquisitions.
///
/// Clones share the same flag. Once cancelled, every acquisition that
/// observes the token fails with [`LockError::Interrupted`] until
/// [`reset`](Self::reset) is called.
///
/// [`LockError::Interrupted`]: crate::LockError::Interrupted
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to all holders of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag so future acquisitions may proceed.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}
