//! Internal synchronization building blocks.
//!
//! Switches between the standard library and loom's model-checked versions
//! based on `--cfg loom`. Everything the primitives build on goes through
//! here so that loom sees every atomic access and every condition variable.
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p vs-primitives --release
//! ```

use std::sync::PoisonError;

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::{Condvar, Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};

/// Lock an internal state mutex.
///
/// Poisoning is ignored: internal state is only touched by short sections in
/// this crate that never run caller code, so it is consistent even if a
/// holder panicked.
pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Block on `condvar` until notified (or spuriously woken).
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Block on `condvar` for at most `timeout`.
#[cfg(not(loom))]
pub(crate) fn wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: std::time::Duration,
) -> MutexGuard<'a, T> {
    let (guard, _timed_out) = condvar
        .wait_timeout(guard, timeout)
        .unwrap_or_else(PoisonError::into_inner);
    guard
}

/// One iteration of a busy-wait loop.
#[inline]
pub(crate) fn spin_wait() {
    // loom only explores other threads at explicit yield points
    #[cfg(loom)]
    loom::thread::yield_now();

    #[cfg(not(loom))]
    std::hint::spin_loop();
}

/// Give up the processor so another task can run.
#[inline]
pub(crate) fn yield_now() {
    #[cfg(loom)]
    loom::thread::yield_now();

    #[cfg(not(loom))]
    std::thread::yield_now();
}
