//! Reader-writer lock: many concurrent readers or one exclusive writer.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | ReadersXorWriter | DST, proptest, stateright |
//! | SingleWriter | DST, stateright |
//! | BalancedSections | DST |
//!
//! Admission depends on `RwPolicy`. Under `WriterPriority` (the default) a
//! waiting writer blocks new readers, so a steady stream of readers cannot
//! starve writers. Under `ReaderPriority` readers are admitted whenever no
//! writer is inside, which maximizes read throughput and can starve writers.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
#[cfg(not(loom))]
use std::time::{Duration, Instant};

use crate::error::{LockError, LockResult};
use crate::sync::{self, Condvar, Mutex as StateMutex};
use crate::task_id::TaskId;

/// Upper bound on simultaneous readers.
const READERS_COUNT_MAX: u32 = u32::MAX - 1;

/// Admission policy when readers and writers compete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RwPolicy {
    /// A waiting writer blocks newly arriving readers.
    #[default]
    WriterPriority,
    /// Readers enter whenever no writer is inside.
    ReaderPriority,
}

/// Point-in-time view of the lock's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwSnapshot {
    pub readers: u32,
    pub writer_active: bool,
    pub writers_waiting: u32,
}

struct RwState {
    readers: u32,
    writer: u64,
    writers_waiting: u32,
}

impl RwState {
    fn write_admissible(&self) -> bool {
        self.writer == TaskId::NONE && self.readers == 0
    }
}

/// The bare reader-writer lock.
pub struct RawRwLock {
    state: StateMutex<RwState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
    policy: RwPolicy,
}

impl RawRwLock {
    /// Create an unlocked lock with the default (writer-priority) policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RwPolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: RwPolicy) -> Self {
        Self {
            state: StateMutex::new(RwState {
                readers: 0,
                writer: TaskId::NONE,
                writers_waiting: 0,
            }),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> RwPolicy {
        self.policy
    }

    fn read_admissible(&self, state: &RwState) -> bool {
        if state.writer != TaskId::NONE || state.readers >= READERS_COUNT_MAX {
            return false;
        }
        match self.policy {
            RwPolicy::WriterPriority => state.writers_waiting == 0,
            RwPolicy::ReaderPriority => true,
        }
    }

    fn assert_not_writer(state: &RwState, me: TaskId) {
        assert!(
            state.writer != me.as_u64(),
            "task {} requested a reader-writer lock it holds for writing",
            me
        );
    }

    /// Block until the calling task is admitted as a reader.
    ///
    /// Under `WriterPriority` a task that already reads and reads again may
    /// block behind a waiting writer.
    ///
    /// # Panics
    ///
    /// Panics if the calling task holds the lock for writing.
    pub fn acquire_read(&self) {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        Self::assert_not_writer(&state, me);

        while !self.read_admissible(&state) {
            state = sync::wait(&self.readers_cv, state);
        }
        state.readers += 1;
    }

    /// Enter as a reader if admissible right now.
    pub fn try_acquire_read(&self) -> bool {
        let mut state = sync::lock_state(&self.state);
        if self.read_admissible(&state) {
            state.readers += 1;
            true
        } else {
            false
        }
    }

    /// Wait at most `timeout` to enter as a reader.
    #[cfg(not(loom))]
    pub fn try_acquire_read_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_acquire_read_until(deadline),
            None => {
                self.acquire_read();
                true
            }
        }
    }

    /// Wait until `deadline` at the latest to enter as a reader.
    #[cfg(not(loom))]
    pub fn try_acquire_read_until(&self, deadline: Instant) -> bool {
        let mut state = sync::lock_state(&self.state);
        loop {
            if self.read_admissible(&state) {
                state.readers += 1;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = sync::wait_timeout(&self.readers_cv, state, deadline - now);
        }
    }

    /// Leave as a reader. The last reader out wakes a waiting writer.
    pub fn release_read(&self) -> LockResult<()> {
        let mut state = sync::lock_state(&self.state);
        if state.readers == 0 {
            log::warn!("task {} released a read lock nobody holds", TaskId::current());
            return Err(LockError::NotLocked);
        }
        state.readers -= 1;
        let wake_writer = state.readers == 0 && state.writers_waiting > 0;
        drop(state);
        if wake_writer {
            self.writers_cv.notify_one();
        }
        Ok(())
    }

    /// Block until the calling task is the sole writer.
    ///
    /// Readers are counted, not tracked by task, so a task that still holds
    /// the lock for reading waits on itself here forever. Release the read
    /// first, or use a timed acquire to get `false` back instead.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds the lock for writing.
    pub fn acquire_write(&self) {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        Self::assert_not_writer(&state, me);

        state.writers_waiting += 1;
        while !state.write_admissible() {
            state = sync::wait(&self.writers_cv, state);
        }
        state.writers_waiting -= 1;
        state.writer = me.as_u64();
    }

    /// Enter as the writer if the lock is completely free right now.
    pub fn try_acquire_write(&self) -> bool {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        if state.write_admissible() {
            state.writer = me.as_u64();
            true
        } else {
            false
        }
    }

    /// Wait at most `timeout` to enter as the writer.
    #[cfg(not(loom))]
    pub fn try_acquire_write_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_acquire_write_until(deadline),
            None => {
                self.acquire_write();
                true
            }
        }
    }

    /// Wait until `deadline` at the latest to enter as the writer.
    #[cfg(not(loom))]
    pub fn try_acquire_write_until(&self, deadline: Instant) -> bool {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        if state.writer == me.as_u64() {
            return false;
        }

        state.writers_waiting += 1;
        loop {
            if state.write_admissible() {
                state.writers_waiting -= 1;
                state.writer = me.as_u64();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = sync::wait_timeout(&self.writers_cv, state, deadline - now);
        }

        // Giving up may unblock readers held back by this writer, and may
        // have swallowed a wakeup meant for another writer.
        state.writers_waiting -= 1;
        let pass_on = state.write_admissible() && state.writers_waiting > 0;
        drop(state);
        self.readers_cv.notify_all();
        if pass_on {
            self.writers_cv.notify_one();
        }
        log::debug!("task {} gave up waiting for write access", me);
        false
    }

    /// Leave as the writer and wake whoever is now admissible.
    pub fn release_write(&self) -> LockResult<()> {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        match TaskId::from_raw(state.writer) {
            None => {
                log::warn!("task {} released a write lock nobody holds", me);
                Err(LockError::NotLocked)
            }
            Some(holder) if holder != me => {
                log::warn!("task {} released a write lock held by task {}", me, holder);
                Err(LockError::NotOwner { holder, caller: me })
            }
            Some(_) => {
                state.writer = TaskId::NONE;
                let writers_waiting = state.writers_waiting > 0;
                drop(state);
                // admission predicates decide who actually gets in
                if writers_waiting {
                    self.writers_cv.notify_one();
                }
                self.readers_cv.notify_all();
                Ok(())
            }
        }
    }

    /// Current occupancy.
    #[must_use]
    pub fn snapshot(&self) -> RwSnapshot {
        let state = sync::lock_state(&self.state);
        RwSnapshot {
            readers: state.readers,
            writer_active: state.writer != TaskId::NONE,
            writers_waiting: state.writers_waiting,
        }
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRwLock")
            .field("policy", &self.policy)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// A value protected by a `RawRwLock`.
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

// SAFETY: readers share `&T` (needs Sync), the writer gets `&mut T` (needs Send).
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self::with_policy(value, RwPolicy::default())
    }

    pub fn with_policy(value: T, policy: RwPolicy) -> Self {
        Self {
            raw: RawRwLock::with_policy(policy),
            data: UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.raw.acquire_read();
        RwLockReadGuard::new(self)
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.raw.try_acquire_read().then(|| RwLockReadGuard::new(self))
    }

    #[cfg(not(loom))]
    pub fn try_read_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, T>> {
        self.raw
            .try_acquire_read_for(timeout)
            .then(|| RwLockReadGuard::new(self))
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.raw.acquire_write();
        RwLockWriteGuard::new(self)
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.raw.try_acquire_write().then(|| RwLockWriteGuard::new(self))
    }

    #[cfg(not(loom))]
    pub fn try_write_for(&self, timeout: Duration) -> Option<RwLockWriteGuard<'_, T>> {
        self.raw
            .try_acquire_write_for(timeout)
            .then(|| RwLockWriteGuard::new(self))
    }

    #[must_use]
    pub fn snapshot(&self) -> RwSnapshot {
        self.raw.snapshot()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwLock");
        match self.try_read() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Shared access to an `RwLock`'s value. Leaves the lock when dropped.
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only shares `&T`.
unsafe impl<T: Sync> Sync for RwLockReadGuard<'_, T> {}

impl<'a, T> RwLockReadGuard<'a, T> {
    fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a reader is admitted, so no writer is inside.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.lock.raw.release_read();
        debug_assert!(released.is_ok(), "read guard release failed: {:?}", released);
    }
}

/// Exclusive access to an `RwLock`'s value. Leaves the lock when dropped.
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only shares `&T`.
unsafe impl<T: Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<'a, T> RwLockWriteGuard<'a, T> {
    fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the calling task is the only occupant.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the calling task is the only occupant.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.lock.raw.release_write();
        debug_assert!(released.is_ok(), "write guard release failed: {:?}", released);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_readers_share() {
        let lock = RwLock::new(7);
        let a = lock.read();
        let b = lock.try_read().expect("second reader admitted");
        assert_eq!(*a + *b, 14);
        assert_eq!(lock.snapshot().readers, 2);
        assert!(lock.try_write().is_none());
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = Arc::new(RwLock::new(0));
        let mut w = lock.write();
        *w = 5;

        let other = Arc::clone(&lock);
        let admitted = thread::spawn(move || other.try_read().is_some())
            .join()
            .unwrap();
        assert!(!admitted);

        let snap = lock.snapshot();
        assert!(snap.writer_active);
        assert_eq!(snap.readers, 0);
        drop(w);
        assert_eq!(*lock.read(), 5);
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(RwLock::new(()));
        let first = lock.read();

        let writer_lock = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let _w = writer_lock.write();
        });

        while lock.snapshot().writers_waiting == 0 {
            thread::yield_now();
        }

        let reader_lock = Arc::clone(&lock);
        let late_reader = thread::spawn(move || reader_lock.try_read().is_some())
            .join()
            .unwrap();
        assert!(!late_reader, "writer priority must hold back new readers");

        drop(first);
        writer.join().unwrap();
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_reader_priority_admits_past_waiting_writer() {
        let lock = Arc::new(RwLock::with_policy((), RwPolicy::ReaderPriority));
        let first = lock.read();

        let writer_lock = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let _w = writer_lock.write();
        });

        while lock.snapshot().writers_waiting == 0 {
            thread::yield_now();
        }

        let reader_lock = Arc::clone(&lock);
        let late_reader = thread::spawn(move || reader_lock.try_read().is_some())
            .join()
            .unwrap();
        assert!(late_reader);

        drop(first);
        writer.join().unwrap();
    }

    #[test]
    fn test_timed_writer_gives_up_and_unblocks_readers() {
        let lock = Arc::new(RwLock::new(()));
        let reader = lock.read();
        let barrier = Arc::new(Barrier::new(2));

        let writer_lock = Arc::clone(&lock);
        let writer_barrier = Arc::clone(&barrier);
        let writer = thread::spawn(move || {
            writer_barrier.wait();
            writer_lock.try_write_for(Duration::from_millis(30)).is_some()
        });

        barrier.wait();
        assert!(!writer.join().unwrap());
        assert_eq!(lock.snapshot().writers_waiting, 0);
        assert!(lock.try_read().is_some());
        drop(reader);
    }

    #[test]
    fn test_release_errors() {
        let raw = RawRwLock::new();
        assert_eq!(raw.release_read(), Err(LockError::NotLocked));
        assert_eq!(raw.release_write(), Err(LockError::NotLocked));

        raw.acquire_read();
        assert_eq!(raw.release_write(), Err(LockError::NotLocked));
        raw.release_read().unwrap();
    }

    #[test]
    fn test_write_release_by_other_task_rejected() {
        let raw = Arc::new(RawRwLock::new());
        raw.acquire_write();

        let other = Arc::clone(&raw);
        let result = thread::spawn(move || other.release_write()).join().unwrap();
        assert!(matches!(result, Err(LockError::NotOwner { .. })));
        assert!(raw.snapshot().writer_active);
        raw.release_write().unwrap();
    }

    #[test]
    fn test_write_while_reading_is_refused() {
        let raw = RawRwLock::new();
        raw.acquire_read();
        assert!(!raw.try_acquire_write());
        assert!(!raw.try_acquire_write_for(Duration::from_millis(10)));
        assert_eq!(raw.snapshot().writers_waiting, 0);

        raw.release_read().unwrap();
        assert!(raw.try_acquire_write());
        raw.release_write().unwrap();
    }

    #[test]
    #[should_panic(expected = "holds for writing")]
    fn test_read_while_writing_panics() {
        let raw = RawRwLock::new();
        raw.acquire_write();
        raw.acquire_read();
    }

    #[test]
    fn test_writers_serialize() {
        let lock = Arc::new(RwLock::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for j in 0..100 {
                        lock.write().push(i * 100 + j);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.read().len(), 400);
    }
}
