//! Blocking mutual-exclusion lock with owner tracking and timed acquisition.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | MutualExclusion | DST, loom, stateright |
//! | BalancedSections | DST |
//!
//! `RawMutex` is the lock itself: blocking, non-blocking and deadline-bounded
//! acquisition plus an explicit, ownership-checked release. `Mutex<T>` wraps a
//! value and hands out a scoped `MutexGuard` that releases on drop, including
//! during unwinding.
//!
//! A task that acquires a mutex it already holds panics instead of
//! deadlocking. Releasing from a task that is not the holder returns
//! `LockError` and leaves the lock untouched.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
#[cfg(not(loom))]
use std::time::{Duration, Instant};

use crate::error::{LockError, LockResult};
use crate::sync::{self, Condvar, Mutex as StateMutex};
use crate::task_id::TaskId;

/// Lock word: who holds the mutex and how many tasks are blocked on it.
struct LockState {
    owner: u64,
    waiters_count: u32,
}

/// The bare lock. Protects nothing by itself; callers pair acquire with
/// release around their own critical section.
pub struct RawMutex {
    state: StateMutex<LockState>,
    available: Condvar,
}

impl RawMutex {
    /// Create an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StateMutex::new(LockState {
                owner: TaskId::NONE,
                waiters_count: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Block until the calling task holds the lock.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds the lock.
    pub fn acquire(&self) {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        assert!(
            state.owner != me.as_u64(),
            "task {} acquired a mutex it already holds",
            me
        );

        if state.owner != TaskId::NONE {
            log::trace!("task {} waiting for mutex held by task {}", me, state.owner);
        }
        while state.owner != TaskId::NONE {
            state.waiters_count += 1;
            state = sync::wait(&self.available, state);
            state.waiters_count -= 1;
        }
        state.owner = me.as_u64();
    }

    /// Take the lock if it is free. Never blocks.
    ///
    /// Returns `false` when the lock is held, including by the caller.
    pub fn try_acquire(&self) -> bool {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        if state.owner == TaskId::NONE {
            state.owner = me.as_u64();
            true
        } else {
            false
        }
    }

    /// Block for at most `timeout` trying to take the lock.
    #[cfg(not(loom))]
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_acquire_until(deadline),
            // unrepresentable deadline: wait as long as it takes
            None => {
                self.acquire();
                true
            }
        }
    }

    /// Block until `deadline` at the latest trying to take the lock.
    ///
    /// A deadline already in the past degenerates to `try_acquire`. A task
    /// that already holds the lock gets `false` without waiting.
    #[cfg(not(loom))]
    pub fn try_acquire_until(&self, deadline: Instant) -> bool {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);
        if state.owner == me.as_u64() {
            return false;
        }

        loop {
            // ownership is re-checked before the deadline so a wakeup that
            // races with the timeout still takes the lock
            if state.owner == TaskId::NONE {
                state.owner = me.as_u64();
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                log::debug!(
                    "task {} gave up on mutex held by task {} at deadline",
                    me,
                    state.owner
                );
                return false;
            }

            state.waiters_count += 1;
            state = sync::wait_timeout(&self.available, state, deadline - now);
            state.waiters_count -= 1;
        }
    }

    /// Release the lock held by the calling task and wake one waiter.
    pub fn release(&self) -> LockResult<()> {
        let me = TaskId::current();
        let mut state = sync::lock_state(&self.state);

        match TaskId::from_raw(state.owner) {
            None => {
                log::warn!("task {} released an unlocked mutex", me);
                Err(LockError::NotLocked)
            }
            Some(holder) if holder != me => {
                log::warn!("task {} released a mutex held by task {}", me, holder);
                Err(LockError::NotOwner { holder, caller: me })
            }
            Some(_) => {
                state.owner = TaskId::NONE;
                let waiting = state.waiters_count > 0;
                drop(state);
                if waiting {
                    self.available.notify_one();
                }
                Ok(())
            }
        }
    }

    /// Whether any task holds the lock. Only a hint under contention.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        sync::lock_state(&self.state).owner != TaskId::NONE
    }

    /// Task currently holding the lock.
    #[must_use]
    pub fn holder(&self) -> Option<TaskId> {
        TaskId::from_raw(sync::lock_state(&self.state).owner)
    }

    /// Whether the calling task holds the lock.
    #[must_use]
    pub fn is_held_by_current(&self) -> bool {
        self.holder() == Some(TaskId::current())
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex")
            .field("holder", &self.holder())
            .finish()
    }
}

/// A value protected by a `RawMutex`.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `raw`.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Create an unlocked mutex holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Block until the lock is held and return a guard.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds this mutex.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.acquire();
        MutexGuard::new(self)
    }

    /// Return a guard if the lock is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_acquire().then(|| MutexGuard::new(self))
    }

    /// Wait at most `timeout` for the lock.
    #[cfg(not(loom))]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        self.raw
            .try_acquire_for(timeout)
            .then(|| MutexGuard::new(self))
    }

    /// Wait until `deadline` at the latest for the lock.
    #[cfg(not(loom))]
    pub fn try_lock_until(&self, deadline: Instant) -> Option<MutexGuard<'_, T>> {
        self.raw
            .try_acquire_until(deadline)
            .then(|| MutexGuard::new(self))
    }

    /// Whether any task holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Mutable access without locking; the borrow proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the mutex and return the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Scoped holder of a `Mutex`. Releases the lock when dropped.
///
/// Not `Send`: the lock must be released by the task that took it.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only shares `&T`.
unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        debug_assert!(mutex.raw.is_held_by_current());
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the calling task holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the calling task holds the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.mutex.raw.release();
        debug_assert!(released.is_ok(), "guard release failed: {:?}", released);
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_modify() {
        let mutex = Mutex::new(1);
        {
            let mut guard = mutex.lock();
            *guard += 41;
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
        assert_eq!(mutex.into_inner(), 42);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let mutex = Arc::new(Mutex::new(()));
        let _guard = mutex.lock();

        let other = Arc::clone(&mutex);
        let got = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(!got);
    }

    #[test]
    #[should_panic(expected = "already holds")]
    fn test_recursive_acquire_panics() {
        let raw = RawMutex::new();
        raw.acquire();
        raw.acquire();
    }

    #[test]
    fn test_release_unlocked_is_error() {
        let raw = RawMutex::new();
        assert_eq!(raw.release(), Err(LockError::NotLocked));
    }

    #[test]
    fn test_release_by_non_owner_is_error() {
        let raw = Arc::new(RawMutex::new());
        raw.acquire();
        let holder = TaskId::current();

        let other = Arc::clone(&raw);
        let result = thread::spawn(move || (other.release(), TaskId::current()))
            .join()
            .unwrap();

        match result {
            (Err(LockError::NotOwner { holder: h, caller }), caller_id) => {
                assert_eq!(h, holder);
                assert_eq!(caller, caller_id);
            }
            other => panic!("unexpected result {:?}", other),
        }
        // lock is untouched
        assert!(raw.is_held_by_current());
        raw.release().unwrap();
    }

    #[test]
    fn test_try_acquire_by_holder_is_false() {
        let raw = RawMutex::new();
        raw.acquire();
        assert!(!raw.try_acquire());
        assert!(!raw.try_acquire_for(Duration::from_millis(5)));
        raw.release().unwrap();
    }

    #[test]
    fn test_timed_acquire_succeeds_after_release() {
        let mutex = Arc::new(Mutex::new(0u32));
        let guard = mutex.lock();

        let other = Arc::clone(&mutex);
        let waiter = thread::spawn(move || {
            let mut g = other.try_lock_for(Duration::from_secs(5)).expect("lock freed in time");
            *g += 1;
        });

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        waiter.join().unwrap();
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn test_past_deadline_is_try_acquire() {
        let raw = RawMutex::new();
        let past = Instant::now();
        thread::sleep(Duration::from_millis(1));
        assert!(raw.try_acquire_until(past));
        raw.release().unwrap();
    }

    #[test]
    fn test_guard_released_on_panic() {
        let mutex = Arc::new(Mutex::new(()));
        let other = Arc::clone(&mutex);
        let result = thread::spawn(move || {
            let _guard = other.lock();
            panic!("inside critical section");
        })
        .join();

        assert!(result.is_err());
        assert!(!mutex.is_locked());
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn test_debug_shows_locked() {
        let mutex = Mutex::new(3);
        assert_eq!(format!("{:?}", mutex), "Mutex { data: 3 }");
        let _g = mutex.lock();
        assert_eq!(format!("{:?}", mutex), "Mutex { data: <locked> }");
    }

    #[test]
    fn test_contended_increments() {
        let mutex = Arc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 20_000);
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_mutex_serializes_updates() {
        loom::model(|| {
            let mutex = Arc::new(Mutex::new(0u32));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let mutex = Arc::clone(&mutex);
                    thread::spawn(move || {
                        let mut guard = mutex.lock();
                        let seen = *guard;
                        thread::yield_now();
                        *guard = seen + 1;
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(*mutex.lock(), 2);
        });
    }
}
