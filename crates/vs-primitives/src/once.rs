//! Lazily initialized value, computed exactly once.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | ExactlyOnceInit | DST, loom, stateright |
//! | SingleInstance | DST |
//!
//! The corrected double-checked locking pattern. The fast path is an Acquire
//! load of the `initialized` flag; the slow path takes the guard and checks
//! again before running the initializer, and publishes the value with a
//! Release store. Compare `buggy::SingleCheckLazy`, which skips the second
//! check.
//!
//! If the initializer panics the cell stays uninitialized and the next caller
//! runs its own initializer.

use std::cell::UnsafeCell;
use std::fmt;

use crate::sync::{self, AtomicBool, Mutex as StateMutex, Ordering};

pub struct InitOnce<T> {
    initialized: AtomicBool,
    guard: StateMutex<()>,
    value: UnsafeCell<Option<T>>,
}

// SAFETY: the value is written once under `guard` before `initialized` is
// published, and only shared afterwards.
unsafe impl<T: Send> Send for InitOnce<T> {}
unsafe impl<T: Send + Sync> Sync for InitOnce<T> {}

impl<T> InitOnce<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            guard: StateMutex::new(()),
            value: UnsafeCell::new(None),
        }
    }

    /// The value, if some caller has already initialized it.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.initialized.load(Ordering::Acquire) {
            // SAFETY: published with Release after the single write.
            unsafe { (*self.value.get()).as_ref() }
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Return the value, running `init` first if nobody has yet.
    ///
    /// Concurrent callers block until the single initializer finishes and
    /// then all observe the same value. Calling `get_or_init` on the same
    /// cell from inside `init` deadlocks.
    pub fn get_or_init<F>(&self, init: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get() {
            return value;
        }

        let _guard = sync::lock_state(&self.guard);
        if let Some(value) = self.get() {
            return value;
        }

        let value = init();
        log::trace!("init-once cell initialized");

        // SAFETY: `initialized` is false and the guard is held, so no reader
        // can reach the slot and no other initializer can be here.
        let slot = unsafe { &mut *self.value.get() };
        let value: &T = slot.insert(value);
        self.initialized.store(true, Ordering::Release);
        value
    }

    /// Consume the cell and return the value, if initialized.
    pub fn into_inner(self) -> Option<T> {
        self.value.into_inner()
    }
}

impl<T> Default for InitOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for InitOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InitOnce").field(&self.get()).finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initializes_once() {
        let cell = InitOnce::new();
        assert!(cell.get().is_none());
        assert_eq!(*cell.get_or_init(|| 5), 5);
        assert_eq!(*cell.get_or_init(|| 6), 5);
        assert!(cell.is_initialized());
        assert_eq!(cell.into_inner(), Some(5));
    }

    #[test]
    fn test_concurrent_callers_share_instance() {
        let cell = Arc::new(InitOnce::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    let value = cell.get_or_init(|| {
                        runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(10));
                        String::from("instance")
                    });
                    value as *const String as usize
                })
            })
            .collect();

        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_panicking_initializer_leaves_cell_empty() {
        let cell = InitOnce::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cell.get_or_init(|| -> u32 { panic!("init failed") });
        }));
        assert!(result.is_err());
        assert!(!cell.is_initialized());
        assert_eq!(*cell.get_or_init(|| 9), 9);
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::atomic::AtomicUsize;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_init_runs_once() {
        loom::model(|| {
            let cell = Arc::new(InitOnce::new());
            let runs = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let cell = Arc::clone(&cell);
                    let runs = Arc::clone(&runs);
                    thread::spawn(move || {
                        *cell.get_or_init(|| {
                            runs.fetch_add(1, Ordering::SeqCst);
                            42u32
                        })
                    })
                })
                .collect();

            for h in handles {
                assert_eq!(h.join().unwrap(), 42);
            }
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        });
    }
}
