//! Deterministic scheduler for simulated threads.
//!
//! Used by `DstHarness::run_concurrent`, which interleaves the operations of
//! several logical threads on one OS thread. At every yield point the
//! scheduler decides, from its seeded RNG, whether to keep running the
//! current thread or switch to another unfinished one.

use crate::random::DeterministicRng;

/// Outcome of a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread.
    Continue,
    /// Switch to the given thread.
    SwitchTo(usize),
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    current: usize,
    finished: Vec<bool>,
    yield_probability: f64,
}

impl Scheduler {
    #[must_use]
    pub fn new(rng: DeterministicRng, threads_count: usize, yield_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "scheduler needs at least one thread");
        Self {
            rng,
            current: 0,
            finished: vec![false; threads_count],
            yield_probability,
        }
    }

    #[must_use]
    pub fn current_thread(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn threads_count(&self) -> usize {
        self.finished.len()
    }

    /// Mark `thread` as having no more operations.
    pub fn mark_finished(&mut self, thread: usize) {
        self.finished[thread] = true;
    }

    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.finished.iter().all(|f| *f)
    }

    /// Decide at a yield point.
    pub fn decide(&mut self) -> ScheduleDecision {
        if !self.finished[self.current] && !self.rng.gen_bool(self.yield_probability) {
            return ScheduleDecision::Continue;
        }
        self.force_switch()
    }

    /// Switch to a random unfinished thread other than the current one if
    /// there is one.
    pub fn force_switch(&mut self) -> ScheduleDecision {
        let candidates: Vec<usize> = (0..self.finished.len())
            .filter(|&t| t != self.current && !self.finished[t])
            .collect();

        if candidates.is_empty() {
            return ScheduleDecision::Continue;
        }
        let next = candidates[self.rng.gen_range(0..candidates.len())];
        self.current = next;
        ScheduleDecision::SwitchTo(next)
    }
}
