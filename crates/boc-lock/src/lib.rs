//! Upgradable read/write lock for the bitemporal object cache.
//!
//! [`UpgradableRwLock`] behaves like a writer-preferring `RwLock` with one
//! extra transition: a [`ReadGuard`] can be promoted to a [`WriteGuard`]
//! without releasing its permit, so a check made under the read permit still
//! holds once the write permit is granted.
//!
//! # States
//!
//! - `Idle` -- nobody holds the lock
//! - `Read(n)` -- `n` readers
//! - `Upgrading` -- one reader is waiting for the others to drain; new
//!   readers block
//! - `Write` -- a single writer
//!
//! Blocked acquisitions can be aborted through a [`CancelToken`] or a
//! configured timeout. A failed acquisition never changes the lock state.

#![forbid(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod lock;

pub use cancel::CancelToken;
pub use error::{LockError, LockResult};
pub use lock::{LockMode, ReadGuard, UpgradableRwLock, WriteGuard};
