//! Lock-free shared counter.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostUpdates | DST, loom |
//! | NoPhantomUpdates | DST |
//!
//! Every increment is a single atomic read-modify-write, so concurrent
//! increments never overwrite each other. Compare `buggy::RacyCounter`,
//! which splits the same operation into a load and a store.

use std::fmt;

use crate::sync::{AtomicU64, Ordering};

/// A counter that any number of tasks may increment concurrently.
///
/// All accesses are sequentially consistent: the counter is also used as a
/// progress flag in the scenarios, and the cost difference is irrelevant
/// next to the contention it sees.
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a counter starting at `initial`.
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Add one and return the new value.
    pub fn increment(&self) -> u64 {
        self.add(1)
    }

    /// Add `amount` and return the new value. Wraps on overflow.
    pub fn add(&self, amount: u64) -> u64 {
        self.value
            .fetch_add(amount, Ordering::SeqCst)
            .wrapping_add(amount)
    }

    /// Current value.
    #[must_use]
    pub fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCounter")
            .field("value", &self.read())
            .finish()
    }
}


#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_increments_not_lost() {
        loom::model(|| {
            let counter = Arc::new(AtomicCounter::default());

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    thread::spawn(move || {
                        counter.increment();
                        counter.increment();
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(counter.read(), 4);
        });
    }
}
