//! Intentionally broken primitives.
//!
//! Each reproduces a classic synchronization bug while staying memory-safe,
//! so the checkers have something real to catch. Do not use them for
//! anything else.
//!
//! | Type | Bug | Caught By |
//! |------|-----|-----------|
//! | `RacyCounter` | read-modify-write split into load + store | DST, loom |
//! | `NaiveSignal` | notify without a flag: early notify is lost | DST, stateright |
//! | `SingleCheckLazy` | no re-check under the lock: repeated init | DST, stateright |

use crate::sync::{self, AtomicU64, Ordering};

/// Counter whose increment is a separate load and store.
///
/// Two tasks can load the same value and both store value + 1, losing an
/// update. The task yields between the load and the store, so the window
/// opens even when every task shares one CPU.
pub struct RacyCounter {
    value: AtomicU64,
}

impl RacyCounter {
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// BUG: not atomic as a whole.
    pub fn increment(&self) -> u64 {
        let seen = self.value.load(Ordering::SeqCst);
        sync::yield_now();
        let next = seen.wrapping_add(1);
        self.value.store(next, Ordering::SeqCst);
        next
    }

    #[must_use]
    pub fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Default for RacyCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(not(loom))]
pub use timed::{NaiveSignal, SingleCheckLazy};

#[cfg(not(loom))]
mod timed {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    /// Condition variable used without a flag.
    ///
    /// A notify that happens before the waiter blocks wakes nobody, and the
    /// waiter then sleeps until its timeout. A spurious wakeup is also
    /// reported as a notification.
    #[derive(Default)]
    pub struct NaiveSignal {
        guard: Mutex<()>,
        wakeup: Condvar,
    }

    impl NaiveSignal {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// BUG: records nothing, so only tasks already waiting are woken.
        pub fn notify(&self) {
            let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
            self.wakeup.notify_all();
        }

        /// Returns true if woken before `timeout` elapsed.
        ///
        /// BUG: no predicate, so "woken" and "notified" are conflated.
        pub fn wait_timeout(&self, timeout: Duration) -> bool {
            let guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
            let (_guard, result) = self
                .wakeup
                .wait_timeout(guard, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            !result.timed_out()
        }
    }

    /// Lazily created shared value that checks `initialized` only outside
    /// the lock.
    ///
    /// Every task that passes the unlocked check before the first
    /// initializer publishes will run its own initializer and replace the
    /// instance.
    pub struct SingleCheckLazy<T> {
        initialized: AtomicBool,
        slot: Mutex<Option<Arc<T>>>,
        runs: AtomicU64,
    }

    impl<T> SingleCheckLazy<T> {
        #[must_use]
        pub fn new() -> Self {
            Self {
                initialized: AtomicBool::new(false),
                slot: Mutex::new(None),
                runs: AtomicU64::new(0),
            }
        }

        fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<T>>> {
            self.slot.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn get_or_init<F>(&self, init: F) -> Arc<T>
        where
            F: FnOnce() -> T,
        {
            if self.initialized.load(Ordering::Acquire) {
                if let Some(existing) = self.lock_slot().as_ref() {
                    return Arc::clone(existing);
                }
            }

            // BUG: no second check once the lock is held
            let mut slot = self.lock_slot();
            let fresh = Arc::new(init());
            self.runs.fetch_add(1, Ordering::SeqCst);
            *slot = Some(Arc::clone(&fresh));
            self.initialized.store(true, Ordering::Release);
            fresh
        }

        /// How many times an initializer ran.
        #[must_use]
        pub fn initializer_runs(&self) -> u64 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl<T> Default for SingleCheckLazy<T> {
        fn default() -> Self {
            Self::new()
        }
    }
}


#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    #[should_panic]
    fn loom_finds_lost_update() {
        loom::model(|| {
            let counter = Arc::new(RacyCounter::default());

            let other = {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    counter.increment();
                })
            };
            counter.increment();
            other.join().unwrap();

            assert_eq!(counter.read(), 2, "lost update");
        });
    }
}
