//! # vs-primitives
//!
//! Synchronization primitives with stated invariants and known failure
//! modes.
//!
//! Each primitive:
//! - Documents its invariants and how they are verified
//! - Has unit tests and DST tests that check the invariants from `vs-core`
//! - Has loom tests for thread interleavings (under `#[cfg(loom)]`)
//!
//! # Locks
//!
//! - `mutex`: blocking mutex with owner tracking and timed acquisition
//! - `rwlock`: reader-writer lock with writer or reader priority
//! - `spin`: test-and-test-and-set spin lock
//!
//! # Coordination
//!
//! - `signal`: one-shot signal with payload, predicate and timed waits
//! - `once`: double-checked init-once cell
//! - `atomic_counter`: lock-free counter
//! - `task`: packaged tasks, futures and parallel for-each
//!
//! # Failure modes
//!
//! - `hazards`: deadlock and livelock scenarios and the lock-ordering remedy
//! - `buggy`: intentionally broken counter, signal and lazy initializer

pub mod atomic_counter;
pub mod buggy;
pub mod error;
#[cfg(not(loom))]
pub mod hazards;
pub mod mutex;
pub mod once;
pub mod rwlock;
pub mod signal;
pub mod spin;
mod sync;
#[cfg(not(loom))]
pub mod task;
pub mod task_id;

pub use atomic_counter::AtomicCounter;
pub use buggy::RacyCounter;
#[cfg(not(loom))]
pub use buggy::{NaiveSignal, SingleCheckLazy};
pub use error::{LockError, LockResult, SignalError, TaskError};
#[cfg(not(loom))]
pub use hazards::{acquire_both, Backoff, LivelockOutcome, PairOutcome};
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use once::InitOnce;
pub use rwlock::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard, RwPolicy, RwSnapshot};
pub use signal::{FirePolicy, OneShotSignal};
pub use spin::{RawSpinLock, SpinLock, SpinLockGuard};
#[cfg(not(loom))]
pub use task::{for_each_parallel, spawn_task, PackagedTask, TaskFuture};
pub use task_id::TaskId;
