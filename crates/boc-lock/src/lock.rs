use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::error::{LockError, LockResult};

/// How often a waiter with a cancel token re-checks it.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Snapshot of the lock's state, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Idle,
    Read(usize),
    Upgrading,
    Write,
}

/// Internal bookkeeping protected by the state mutex.
#[derive(Default)]
struct LockState {
    /// Read permits currently granted (includes a pending upgrader).
    readers: usize,
    /// Thread holding the write permit.
    writer: Option<ThreadId>,
    /// Reader thread waiting to become the writer.
    upgrading: Option<ThreadId>,
    /// Threads blocked in `write`; they hold off new readers.
    writers_waiting: usize,
}

impl LockState {
    fn mode(&self) -> LockMode {
        if self.writer.is_some() {
            LockMode::Write
        } else if self.upgrading.is_some() {
            LockMode::Upgrading
        } else if self.readers > 0 {
            LockMode::Read(self.readers)
        } else {
            LockMode::Idle
        }
    }

    fn admits_reader(&self) -> bool {
        self.writer.is_none() && self.upgrading.is_none() && self.writers_waiting == 0
    }

    fn admits_writer(&self) -> bool {
        self.writer.is_none() && self.upgrading.is_none() && self.readers == 0
    }
}

/// Writer-preferring read/write lock whose read permits can be upgraded in
/// place.
///
/// Permits are granted by a small state machine; the data itself sits in a
/// `std::sync::RwLock` that a guard takes only once its permit is held, so
/// the inner lock never contends. Guards release both on drop.
///
/// Only one upgrade may be pending at a time. A second reader asking to
/// upgrade while another upgrade is pending gets
/// [`LockError::UpgradeConflict`] and loses its read permit, because the two
/// upgraders would otherwise wait on each other forever. Callers recover by
/// taking a fresh write permit and re-checking.
///
/// Read permits are not reentrant: a thread that already holds one must not
/// block on a second while a writer is waiting.
pub struct UpgradableRwLock<T> {
    state: Mutex<LockState>,
    changed: Condvar,
    timeout: Option<Duration>,
    data: RwLock<T>,
}

impl<T> UpgradableRwLock<T> {
    /// Create a lock that waits indefinitely.
    pub fn new(data: T) -> Self {
        Self::with_timeout(data, None)
    }

    /// Create a lock whose blocking acquisitions give up after `timeout`.
    pub fn with_timeout(data: T, timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
            timeout,
            data: RwLock::new(data),
        }
    }

    /// The configured acquire timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Current state of the lock.
    pub fn mode(&self) -> LockMode {
        self.state().mode()
    }

    /// Returns `true` if the calling thread holds the write permit.
    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.state().writer == Some(thread::current().id())
    }

    /// Acquire a read permit, blocking while a writer holds, waits, or an
    /// upgrade is pending.
    pub fn read(&self) -> LockResult<ReadGuard<'_, T>> {
        self.acquire_read(None)
    }

    /// Like [`read`](Self::read), aborting if `cancel` fires.
    pub fn read_with(&self, cancel: &CancelToken) -> LockResult<ReadGuard<'_, T>> {
        self.acquire_read(Some(cancel))
    }

    /// Acquire the write permit, blocking until all readers have drained.
    pub fn write(&self) -> LockResult<WriteGuard<'_, T>> {
        self.acquire_write(None)
    }

    /// Like [`write`](Self::write), aborting if `cancel` fires.
    pub fn write_with(&self, cancel: &CancelToken) -> LockResult<WriteGuard<'_, T>> {
        self.acquire_write(Some(cancel))
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().expect("lock state poisoned")
    }

    fn acquire_read(&self, cancel: Option<&CancelToken>) -> LockResult<ReadGuard<'_, T>> {
        let deadline = self.deadline();
        let mut state = self.state();
        loop {
            check_cancel(cancel)?;
            if state.admits_reader() {
                state.readers += 1;
                trace!(readers = state.readers, "read permit granted");
                drop(state);
                return Ok(ReadGuard::new(self));
            }
            state = self.wait(state, deadline, cancel)?;
        }
    }

    fn acquire_write(&self, cancel: Option<&CancelToken>) -> LockResult<WriteGuard<'_, T>> {
        let deadline = self.deadline();
        let mut state = self.state();
        state.writers_waiting += 1;
        loop {
            if let Err(e) = check_cancel(cancel) {
                state.writers_waiting -= 1;
                self.changed.notify_all();
                return Err(e);
            }
            if state.admits_writer() {
                state.writers_waiting -= 1;
                state.writer = Some(thread::current().id());
                trace!("write permit granted");
                drop(state);
                return Ok(WriteGuard::new(self));
            }
            state = match self.wait(state, deadline, cancel) {
                Ok(state) => state,
                Err(e) => {
                    let mut state = self.state();
                    state.writers_waiting -= 1;
                    self.changed.notify_all();
                    return Err(e);
                }
            };
        }
    }

    /// Promote one read permit to the write permit.
    ///
    /// The caller's read permit stays counted until the promotion completes,
    /// so no writer can slip in between.
    fn upgrade(&self, cancel: Option<&CancelToken>) -> LockResult<WriteGuard<'_, T>> {
        let deadline = self.deadline();
        let me = thread::current().id();
        let mut state = self.state();

        if state.upgrading.is_some() {
            state.readers -= 1;
            self.changed.notify_all();
            debug!("upgrade refused: another upgrade is pending");
            return Err(LockError::UpgradeConflict);
        }

        state.upgrading = Some(me);
        debug!(readers = state.readers, "upgrade pending");
        loop {
            if let Err(e) = check_cancel(cancel) {
                return Err(self.abandon_upgrade(state, e));
            }
            if state.readers == 1 {
                state.readers = 0;
                state.upgrading = None;
                state.writer = Some(me);
                debug!("upgrade complete");
                drop(state);
                return Ok(WriteGuard::new(self));
            }
            state = match self.wait(state, deadline, cancel) {
                Ok(state) => state,
                Err(e) => {
                    let state = self.state();
                    return Err(self.abandon_upgrade(state, e));
                }
            };
        }
    }

    /// Undo a pending upgrade and drop the upgrader's read permit.
    fn abandon_upgrade(&self, mut state: MutexGuard<'_, LockState>, error: LockError) -> LockError {
        state.upgrading = None;
        state.readers -= 1;
        self.changed.notify_all();
        debug!(%error, "upgrade abandoned");
        error
    }

    fn release_read(&self) {
        let mut state = self.state();
        state.readers -= 1;
        if state.readers <= 1 {
            self.changed.notify_all();
        }
    }

    fn release_write(&self) {
        let mut state = self.state();
        state.writer = None;
        self.changed.notify_all();
    }

    fn downgrade(&self) {
        let mut state = self.state();
        state.writer = None;
        state.readers += 1;
        self.changed.notify_all();
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Block until notified, the deadline passes, or the cancel poll is due.
    fn wait<'a>(
        &self,
        state: MutexGuard<'a, LockState>,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> LockResult<MutexGuard<'a, LockState>> {
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    drop(state);
                    return Err(LockError::Timeout(self.timeout.unwrap_or_default()));
                }
                Some(deadline - now)
            }
            None => None,
        };

        let slice = match (remaining, cancel) {
            (Some(remaining), Some(_)) => Some(remaining.min(CANCEL_POLL)),
            (Some(remaining), None) => Some(remaining),
            (None, Some(_)) => Some(CANCEL_POLL),
            (None, None) => None,
        };

        let state = match slice {
            Some(slice) => {
                self.changed
                    .wait_timeout(state, slice)
                    .expect("lock state poisoned")
                    .0
            }
            None => self.changed.wait(state).expect("lock state poisoned"),
        };
        Ok(state)
    }
}

impl<T: Default> Default for UpgradableRwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for UpgradableRwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradableRwLock")
            .field("mode", &self.mode())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> LockResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(LockError::Interrupted),
        _ => Ok(()),
    }
}

/// A granted read permit, given back on drop.
struct ReadPermit<'a, T> {
    lock: &'a UpgradableRwLock<T>,
}

impl<'a, T> ReadPermit<'a, T> {
    /// Hand the permit to a state transition instead of releasing it.
    fn transfer(self) -> &'a UpgradableRwLock<T> {
        ManuallyDrop::new(self).lock
    }
}

impl<T> Drop for ReadPermit<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// The granted write permit, given back on drop.
struct WritePermit<'a, T> {
    lock: &'a UpgradableRwLock<T>,
}

impl<'a, T> WritePermit<'a, T> {
    fn transfer(self) -> &'a UpgradableRwLock<T> {
        ManuallyDrop::new(self).lock
    }
}

impl<T> Drop for WritePermit<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// Shared access to the protected data; releases the read permit on drop.
pub struct ReadGuard<'a, T> {
    // Declared first so the data borrow ends before the permit is released.
    data: RwLockReadGuard<'a, T>,
    permit: ReadPermit<'a, T>,
}

impl<'a, T> ReadGuard<'a, T> {
    fn new(lock: &'a UpgradableRwLock<T>) -> Self {
        let permit = ReadPermit { lock };
        Self {
            data: lock.data.read().expect("lock poisoned"),
            permit,
        }
    }

    /// Promote this read permit to the write permit.
    ///
    /// Blocks new readers and waits for the other readers to finish. On any
    /// error the read permit has been released.
    pub fn upgrade(self) -> LockResult<WriteGuard<'a, T>> {
        self.promote(None)
    }

    /// Like [`upgrade`](Self::upgrade), aborting if `cancel` fires.
    pub fn upgrade_with(self, cancel: &CancelToken) -> LockResult<WriteGuard<'a, T>> {
        self.promote(Some(cancel))
    }

    fn promote(self, cancel: Option<&CancelToken>) -> LockResult<WriteGuard<'a, T>> {
        let ReadGuard { data, permit } = self;
        drop(data);
        permit.transfer().upgrade(cancel)
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Exclusive access to the protected data; releases the write permit on drop.
pub struct WriteGuard<'a, T> {
    data: RwLockWriteGuard<'a, T>,
    permit: WritePermit<'a, T>,
}

impl<'a, T> WriteGuard<'a, T> {
    fn new(lock: &'a UpgradableRwLock<T>) -> Self {
        let permit = WritePermit { lock };
        Self {
            data: lock.data.write().expect("lock poisoned"),
            permit,
        }
    }

    /// Turn the write permit into a read permit without a gap.
    pub fn downgrade(self) -> ReadGuard<'a, T> {
        let WriteGuard { data, permit } = self;
        drop(data);
        let lock = permit.transfer();
        lock.downgrade();
        ReadGuard::new(lock)
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn modes_follow_guards() {
        let lock = UpgradableRwLock::new(0u32);
        assert_eq!(lock.mode(), LockMode::Idle);
        {
            let a = lock.read().unwrap();
            let b = lock.read().unwrap();
            assert_eq!(lock.mode(), LockMode::Read(2));
            assert_eq!(*a + *b, 0);
        }
        assert_eq!(lock.mode(), LockMode::Idle);
        {
            let mut w = lock.write().unwrap();
            *w = 7;
            assert_eq!(lock.mode(), LockMode::Write);
            assert!(lock.is_write_locked_by_current_thread());
        }
        assert_eq!(lock.mode(), LockMode::Idle);
        assert_eq!(*lock.read().unwrap(), 7);
    }

    #[test]
    fn sole_reader_upgrades_immediately() {
        let lock = UpgradableRwLock::new(vec![1]);
        let r = lock.read().unwrap();
        assert_eq!(r.len(), 1);
        let mut w = r.upgrade().unwrap();
        w.push(2);
        assert_eq!(lock.mode(), LockMode::Write);
        drop(w);
        assert_eq!(lock.mode(), LockMode::Idle);
        assert_eq!(*lock.read().unwrap(), vec![1, 2]);
    }

    #[test]
    fn downgrade_keeps_a_read_permit() {
        let lock = UpgradableRwLock::new(1);
        let w = lock.write().unwrap();
        let r = w.downgrade();
        assert_eq!(lock.mode(), LockMode::Read(1));
        assert_eq!(*r, 1);
        drop(r);
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn upgrade_waits_for_other_readers() {
        let lock = Arc::new(UpgradableRwLock::new(0));
        let other_reader_done = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(2));

        let reader = {
            let lock = Arc::clone(&lock);
            let done = Arc::clone(&other_reader_done);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _r = lock.read().unwrap();
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
                done.store(1, Ordering::SeqCst);
            })
        };

        barrier.wait();
        let r = lock.read().unwrap();
        let mut w = r.upgrade().unwrap();
        assert_eq!(other_reader_done.load(Ordering::SeqCst), 1);
        *w += 1;
        drop(w);
        reader.join().unwrap();
        assert_eq!(*lock.read().unwrap(), 1);
    }

    #[test]
    fn pending_upgrade_blocks_new_readers() {
        let lock = Arc::new(UpgradableRwLock::new(0));
        let held = lock.read().unwrap();

        let upgrader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let r = lock.read().unwrap();
                let mut w = r.upgrade().unwrap();
                *w = 42;
            })
        };

        while lock.mode() != LockMode::Upgrading {
            thread::yield_now();
        }

        let cancel = CancelToken::new();
        let blocked_reader = {
            let lock = Arc::clone(&lock);
            let cancel = cancel.clone();
            thread::spawn(move || lock.read_with(&cancel).map(|r| *r))
        };
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        assert_eq!(blocked_reader.join().unwrap(), Err(LockError::Interrupted));

        drop(held);
        upgrader.join().unwrap();
        assert_eq!(*lock.read().unwrap(), 42);
    }

    #[test]
    fn second_upgrade_conflicts_and_releases_its_permit() {
        let lock = Arc::new(UpgradableRwLock::new(()));
        let mine = lock.read().unwrap();

        let upgrader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let r = lock.read().unwrap();
                r.upgrade().map(|_| ())
            })
        };
        while lock.mode() != LockMode::Upgrading {
            thread::yield_now();
        }

        assert_eq!(mine.upgrade().err(), Some(LockError::UpgradeConflict));
        assert_eq!(upgrader.join().unwrap(), Ok(()));
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn cancelled_write_leaves_state_unchanged() {
        let lock = Arc::new(UpgradableRwLock::new(0));
        let reader = lock.read().unwrap();
        let cancel = CancelToken::new();

        let writer = {
            let lock = Arc::clone(&lock);
            let cancel = cancel.clone();
            thread::spawn(move || lock.write_with(&cancel).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert_eq!(writer.join().unwrap(), Err(LockError::Interrupted));

        assert_eq!(lock.mode(), LockMode::Read(1));
        drop(reader);
        // No waiting writer is left behind to starve readers.
        assert!(lock.read().is_ok());
    }

    #[test]
    fn cancelled_token_fails_fast() {
        let lock = UpgradableRwLock::new(0);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(lock.read_with(&cancel).err(), Some(LockError::Interrupted));
        assert_eq!(lock.write_with(&cancel).err(), Some(LockError::Interrupted));
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn timeout_elapses_while_writer_holds() {
        let lock = Arc::new(UpgradableRwLock::with_timeout(0, Some(Duration::from_millis(20))));
        let w = lock.write().unwrap();
        let other = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.read().map(|_| ()))
        };
        assert_eq!(
            other.join().unwrap(),
            Err(LockError::Timeout(Duration::from_millis(20)))
        );
        drop(w);
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn cancelled_upgrade_releases_read_permit() {
        let lock = Arc::new(UpgradableRwLock::new(0));
        let other = lock.read().unwrap();
        let cancel = CancelToken::new();

        let upgrader = {
            let lock = Arc::clone(&lock);
            let cancel = cancel.clone();
            thread::spawn(move || {
                let r = lock.read().unwrap();
                r.upgrade_with(&cancel).map(|_| ())
            })
        };
        while lock.mode() != LockMode::Upgrading {
            thread::yield_now();
        }
        cancel.cancel();
        assert_eq!(upgrader.join().unwrap(), Err(LockError::Interrupted));
        assert_eq!(lock.mode(), LockMode::Read(1));
        drop(other);
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn lock_is_shared_by_reference_across_threads() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<UpgradableRwLock<Vec<String>>>();

        let lock = UpgradableRwLock::new(vec![1, 2, 3]);
        let total: i32 = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| lock.read().unwrap().iter().sum::<i32>()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(total, 24);
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn panicking_writer_releases_its_permit() {
        let lock = Arc::new(UpgradableRwLock::new(0));
        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let mut w = lock.write().unwrap();
                *w = 1;
                panic!("writer failed");
            })
        };
        assert!(writer.join().is_err());
        assert_eq!(lock.mode(), LockMode::Idle);
        assert!(!lock.is_write_locked_by_current_thread());
    }

    #[test]
    fn upgrade_then_downgrade_sees_the_write() {
        let lock = UpgradableRwLock::new(String::from("a"));
        let r = lock.read().unwrap();
        let mut w = r.upgrade().unwrap();
        w.push('b');
        let r = w.downgrade();
        assert_eq!(&*r, "ab");
        assert_eq!(lock.mode(), LockMode::Read(1));
        drop(r);
        assert_eq!(lock.mode(), LockMode::Idle);
    }

    #[test]
    fn writers_are_exclusive() {
        let lock = Arc::new(UpgradableRwLock::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut w = lock.write().unwrap();
                        let v = *w;
                        *w = v + 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.read().unwrap(), 4_000);
    }
}
