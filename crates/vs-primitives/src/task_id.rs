//! Identity of the calling task (thread).
//!
//! Ownership-checked primitives record which task holds them so that a
//! release from the wrong task is reported and a recursive acquire fails
//! loudly instead of deadlocking.

use std::cell::Cell;
use std::fmt;

/// Source of task ids. Zero is reserved for "no holder".
static NEXT_TASK_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

#[cfg(not(loom))]
std::thread_local! {
    static CURRENT_TASK_ID: Cell<u64> = const { Cell::new(0) };
}

// std thread-locals are shared by every loom thread of one OS thread
#[cfg(loom)]
loom::thread_local! {
    static CURRENT_TASK_ID: Cell<u64> = Cell::new(0);
}

/// Non-zero identifier of a task, stable for the task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Sentinel stored in lock words when nobody holds the lock.
    pub(crate) const NONE: u64 = 0;

    /// Id of the calling task, assigned on first use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT_TASK_ID.with(|slot| {
            let mut id = slot.get();
            if id == Self::NONE {
                id = NEXT_TASK_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                slot.set(id);
            }
            debug_assert!(id != Self::NONE, "task ids start at 1");
            TaskId(id)
        })
    }

    /// Rebuild an id from a lock word. Returns `None` for the sentinel.
    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != Self::NONE).then_some(TaskId(raw))
    }

    /// Numeric value, never zero.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
