//! Busy-waiting mutual-exclusion lock.
//!
//! For very short critical sections where parking a thread costs more than
//! spinning. Test-and-test-and-set: waiters spin on a plain load and only
//! attempt the exchange once the lock looks free, which keeps the cache line
//! shared while it is held.
//!
//! Acquire ordering on the successful exchange and Release ordering on the
//! unlocking store make everything written inside one critical section
//! visible to the next holder.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::error::{LockError, LockResult};
use crate::sync::{self, AtomicBool, AtomicU64, Ordering};
use crate::task_id::TaskId;

/// The bare spin lock.
pub struct RawSpinLock {
    locked: AtomicBool,
    /// Holder's task id, `TaskId::NONE` when free. Diagnostic only; the
    /// flag alone decides ownership.
    holder: AtomicU64,
}

impl RawSpinLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: AtomicU64::new(TaskId::NONE),
        }
    }

    /// Spin until the calling task holds the lock.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds the lock.
    pub fn acquire(&self) {
        let me = TaskId::current();
        // only this task ever stores its own id, so a relaxed load suffices
        assert!(
            self.holder.load(Ordering::Relaxed) != me.as_u64(),
            "task {} acquired a spin lock it already holds",
            me
        );

        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            while self.locked.load(Ordering::Relaxed) {
                sync::spin_wait();
            }
        }
        self.holder.store(me.as_u64(), Ordering::Relaxed);
    }

    /// Take the lock if it is free. Never spins.
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if acquired {
            self.holder
                .store(TaskId::current().as_u64(), Ordering::Relaxed);
        }
        acquired
    }

    /// Release the lock held by the calling task.
    pub fn release(&self) -> LockResult<()> {
        let me = TaskId::current();
        match TaskId::from_raw(self.holder.load(Ordering::Relaxed)) {
            None => Err(LockError::NotLocked),
            Some(holder) if holder != me => {
                log::warn!("task {} released a spin lock held by task {}", me, holder);
                Err(LockError::NotOwner { holder, caller: me })
            }
            Some(_) => {
                self.holder.store(TaskId::NONE, Ordering::Relaxed);
                self.locked.store(false, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Whether any task holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A value protected by a `RawSpinLock`.
pub struct SpinLock<T> {
    raw: RawSpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `raw`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            raw: RawSpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Spin until the lock is held and return a guard.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.raw.acquire();
        SpinLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.raw.try_acquire().then(|| SpinLockGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Scoped holder of a `SpinLock`.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held by this task.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held by this task.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.lock.raw.release();
        debug_assert!(released.is_ok(), "spin guard release failed: {:?}", released);
    }
}


#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_spin_lock_publishes_writes() {
        loom::model(|| {
            let lock = Arc::new(SpinLock::new(0u32));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    thread::spawn(move || {
                        *lock.lock() += 1;
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(*lock.lock(), 2);
        });
    }
}
