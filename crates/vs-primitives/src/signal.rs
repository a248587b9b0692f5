//! One-shot signal: a single UNFIRED -> FIRED transition carrying a payload.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | SingleFire | DST, stateright |
//! | NoLostWakeup | DST, loom, stateright |
//! | FiredIsPermanent | DST |
//!
//! The fired flag is the source of truth. Waiters check it under the same
//! internal lock the firer sets it under, then block on the condition
//! variable, so a fire can never slip between a waiter's check and its
//! sleep. A wait that starts after the fire returns immediately, and a
//! spurious wakeup goes back to sleep unless the flag (or the caller's
//! predicate) is set. Compare `buggy::NaiveSignal`.
//!
//! The payload is written once, before the flag is published with release
//! ordering, so any task that observes the flag can read it.

use std::cell::UnsafeCell;
use std::fmt;
#[cfg(not(loom))]
use std::time::{Duration, Instant};

use crate::error::SignalError;
use crate::sync::{self, AtomicBool, Condvar, Mutex as StateMutex, Ordering};

/// What `fire` does when the signal has already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirePolicy {
    /// Later fires are no-ops and the original payload stays.
    #[default]
    Ignore,
    /// Later fires return `SignalError::AlreadyFired`.
    Reject,
}

/// A signal that fires at most once and wakes every waiter.
pub struct OneShotSignal<T> {
    fired: AtomicBool,
    payload: UnsafeCell<Option<T>>,
    guard: StateMutex<()>,
    wakeup: Condvar,
    policy: FirePolicy,
}

// SAFETY: the payload is written once under `guard` before `fired` is
// published and is only read (shared) after `fired` is observed.
unsafe impl<T: Send> Send for OneShotSignal<T> {}
unsafe impl<T: Send + Sync> Sync for OneShotSignal<T> {}

impl<T> OneShotSignal<T> {
    /// Create an unfired signal that ignores repeated fires.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(FirePolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: FirePolicy) -> Self {
        Self {
            fired: AtomicBool::new(false),
            payload: UnsafeCell::new(None),
            guard: StateMutex::new(()),
            wakeup: Condvar::new(),
            policy,
        }
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// The payload, if the signal has fired. Never blocks.
    #[must_use]
    pub fn try_get(&self) -> Option<&T> {
        if self.fired.load(Ordering::Acquire) {
            // SAFETY: the payload was written before `fired` was stored
            // with Release and is never written again.
            unsafe { (*self.payload.get()).as_ref() }
        } else {
            None
        }
    }

    /// Fire the signal with `payload` and wake every waiter.
    ///
    /// A repeated fire follows the signal's `FirePolicy`; in either case the
    /// first payload is kept.
    pub fn fire(&self, payload: T) -> Result<(), SignalError> {
        let guard = sync::lock_state(&self.guard);
        if self.fired.load(Ordering::Acquire) {
            drop(guard);
            return match self.policy {
                FirePolicy::Ignore => {
                    log::debug!("ignoring repeated fire of one-shot signal");
                    Ok(())
                }
                FirePolicy::Reject => Err(SignalError::AlreadyFired),
            };
        }

        // SAFETY: `fired` is false and `guard` is held, so no reader can
        // reach the payload and no other firer can be here.
        unsafe {
            *self.payload.get() = Some(payload);
        }
        self.fired.store(true, Ordering::Release);
        drop(guard);

        self.wakeup.notify_all();
        Ok(())
    }

    /// Block until the signal fires and return its payload.
    pub fn wait(&self) -> &T {
        if let Some(payload) = self.try_get() {
            return payload;
        }

        let mut guard = sync::lock_state(&self.guard);
        loop {
            if let Some(payload) = self.try_get() {
                return payload;
            }
            guard = sync::wait(&self.wakeup, guard);
        }
    }

    /// Block until the signal fires or `ready` returns true.
    ///
    /// `ready` is evaluated under the signal's internal lock on entry and
    /// after every wakeup, so state it reads must be published through
    /// `notify_all` (or a fire) to be noticed. Returns the payload if the
    /// signal fired, `None` if the predicate released the wait.
    ///
    /// `ready` must not call `notify_all`, `fire` or any wait on this same
    /// signal: the internal lock is already held, so the call deadlocks.
    /// `is_fired` and `try_get` do not take the lock and are safe to call.
    pub fn wait_with_predicate<F>(&self, mut ready: F) -> Option<&T>
    where
        F: FnMut() -> bool,
    {
        let mut guard = sync::lock_state(&self.guard);
        loop {
            if let Some(payload) = self.try_get() {
                return Some(payload);
            }
            if ready() {
                return None;
            }
            guard = sync::wait(&self.wakeup, guard);
        }
    }

    /// Block for at most `timeout` waiting for the signal.
    ///
    /// A timeout too large to form a deadline waits like `wait`.
    #[cfg(not(loom))]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<&T> {
        if let Some(payload) = self.try_get() {
            return Some(payload);
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };

        let mut guard = sync::lock_state(&self.guard);
        loop {
            if let Some(payload) = self.try_get() {
                return Some(payload);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            guard = sync::wait_timeout(&self.wakeup, guard, deadline - now);
        }
    }

    /// Wake every waiter without firing so predicates get re-evaluated.
    pub fn notify_all(&self) {
        // taking the lock orders this after any waiter's predicate check
        drop(sync::lock_state(&self.guard));
        self.wakeup.notify_all();
    }

    /// Consume the signal and return the payload, if it fired.
    pub fn into_inner(self) -> Option<T> {
        self.payload.into_inner()
    }
}

impl<T> Default for OneShotSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for OneShotSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotSignal")
            .field("payload", &self.try_get())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_after_fire_returns_immediately() {
        let signal = OneShotSignal::new();
        signal.fire("Populated").unwrap();
        assert_eq!(*signal.wait(), "Populated");
        assert!(signal.is_fired());
    }

    #[test]
    fn test_waiter_woken_by_fire() {
        let signal = Arc::new(OneShotSignal::new());
        let waiter_signal = Arc::clone(&signal);
        let waiter = thread::spawn(move || *waiter_signal.wait());

        thread::sleep(Duration::from_millis(20));
        signal.fire(99u32).unwrap();
        assert_eq!(waiter.join().unwrap(), 99);
    }

    #[test]
    fn test_repeat_fire_ignored_by_default() {
        let signal = OneShotSignal::new();
        signal.fire(1).unwrap();
        signal.fire(2).unwrap();
        assert_eq!(signal.try_get(), Some(&1));
    }

    #[test]
    fn test_repeat_fire_rejected() {
        let signal = OneShotSignal::with_policy(FirePolicy::Reject);
        signal.fire(1).unwrap();
        assert_eq!(signal.fire(2), Err(SignalError::AlreadyFired));
        assert_eq!(signal.into_inner(), Some(1));
    }

    #[test]
    fn test_wait_timeout_expires_unfired() {
        let signal: OneShotSignal<()> = OneShotSignal::new();
        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_predicate_releases_wait() {
        let signal: Arc<OneShotSignal<()>> = Arc::new(OneShotSignal::new());
        let ready = Arc::new(StdAtomicBool::new(false));

        let waiter_signal = Arc::clone(&signal);
        let waiter_ready = Arc::clone(&ready);
        let waiter = thread::spawn(move || {
            waiter_signal
                .wait_with_predicate(|| waiter_ready.load(std::sync::atomic::Ordering::SeqCst))
                .is_some()
        });

        thread::sleep(Duration::from_millis(10));
        ready.store(true, std::sync::atomic::Ordering::SeqCst);
        signal.notify_all();

        assert!(!waiter.join().unwrap(), "released by predicate, not by fire");
        assert!(!signal.is_fired());
    }

    #[test]
    fn test_predicate_may_read_the_same_signal() {
        let signal = Arc::new(OneShotSignal::new());
        let waiter_signal = Arc::clone(&signal);
        let waiter = thread::spawn(move || {
            let mut checks = 0u32;
            let seen = waiter_signal
                .wait_with_predicate(|| {
                    checks += 1;
                    waiter_signal.try_get().is_some() && !waiter_signal.is_fired()
                })
                .copied();
            (seen, checks)
        });

        thread::sleep(Duration::from_millis(10));
        signal.notify_all();
        signal.fire(9u8).unwrap();

        let (seen, checks) = waiter.join().unwrap();
        assert_eq!(seen, Some(9));
        assert!(checks >= 1);
    }

    #[test]
    fn test_notify_without_fire_does_not_release_plain_wait() {
        let signal: Arc<OneShotSignal<u8>> = Arc::new(OneShotSignal::new());
        let waiter_signal = Arc::clone(&signal);
        let waiter = thread::spawn(move || *waiter_signal.wait());

        thread::sleep(Duration::from_millis(10));
        signal.notify_all();
        thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());

        signal.fire(3).unwrap();
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn test_many_waiters_all_woken() {
        let signal = Arc::new(OneShotSignal::<String>::new());
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || signal.wait().len())
            })
            .collect();

        signal.fire(String::from("go")).unwrap();
        for w in waiters {
            assert_eq!(w.join().unwrap(), 2);
        }
    }

    #[test]
    fn test_unbounded_timeout_waits_for_fire() {
        let signal = Arc::new(OneShotSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_timeout(Duration::MAX).copied())
        };

        thread::sleep(Duration::from_millis(50));
        signal.fire(5u32).unwrap();
        assert_eq!(waiter.join().unwrap(), Some(5));
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_wait_never_misses_fire() {
        loom::model(|| {
            let signal = Arc::new(OneShotSignal::new());

            let firer = {
                let signal = Arc::clone(&signal);
                thread::spawn(move || signal.fire(7u32).unwrap())
            };

            assert_eq!(*signal.wait(), 7);
            firer.join().unwrap();
        });
    }

    #[test]
    fn loom_single_fire_keeps_first_payload() {
        loom::model(|| {
            let signal = Arc::new(OneShotSignal::with_policy(FirePolicy::Reject));

            let handles: Vec<_> = (1..=2u32)
                .map(|v| {
                    let signal = Arc::clone(&signal);
                    thread::spawn(move || signal.fire(v).is_ok())
                })
                .collect();

            let accepted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();

            assert_eq!(accepted, 1);
            assert!(signal.try_get().is_some());
        });
    }
}
