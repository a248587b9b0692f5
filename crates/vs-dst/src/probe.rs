//! Instrumentation wrapped around primitives under test.
//!
//! Primitives know nothing about DST. A test brackets each critical section
//! or signal operation with a probe, and the probe implements the matching
//! property trait from `vs-core` so the checkers can evaluate the run.
//!
//! | Probe | Properties |
//! |-------|------------|
//! | `SectionProbe` | `ExclusionProperties` |
//! | `RwProbe` | `RwLockProperties` |
//! | `SignalRecorder` | `SignalProperties` |
//! | `InitRecorder` | `InitOnceProperties` |
//! | `CounterRun` | `CounterProperties` |
//!
//! Counters inside probes are sequentially consistent. `RwProbe` relies on
//! that: an entering reader and an entering writer each publish themselves
//! before looking at the other, so at least one of them sees the overlap.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use vs_core::invariants::{
    CounterProperties, ExclusionProperties, InitOnceProperties, RwLockProperties, RwObservation,
    SignalHistory, SignalProperties,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Global step counter shared by the operations of one probe.
#[derive(Debug, Default)]
struct Steps(AtomicU64);

impl Steps {
    fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Occupancy probe for an exclusive critical section.
#[derive(Debug, Default)]
pub struct SectionProbe {
    steps: Steps,
    inside: AtomicU64,
    holders_max: AtomicU64,
    holders_max_step: AtomicU64,
    entries: AtomicU64,
    exits: AtomicU64,
}

impl SectionProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call right after acquiring the lock.
    pub fn enter(&self) {
        let step = self.steps.tick();
        self.entries.fetch_add(1, Ordering::SeqCst);
        let holders = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        if self.holders_max.fetch_max(holders, Ordering::SeqCst) < holders {
            self.holders_max_step.store(step, Ordering::SeqCst);
        }
    }

    /// Call right before releasing the lock.
    pub fn exit(&self) {
        self.steps.tick();
        self.inside.fetch_sub(1, Ordering::SeqCst);
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `body` between `enter` and `exit`.
    pub fn section<R>(&self, body: impl FnOnce() -> R) -> R {
        self.enter();
        let result = body();
        self.exit();
        result
    }
}

impl ExclusionProperties for SectionProbe {
    fn holders_max(&self) -> u64 {
        self.holders_max.load(Ordering::SeqCst)
    }

    fn holders_max_step(&self) -> u64 {
        self.holders_max_step.load(Ordering::SeqCst)
    }

    fn holders_now(&self) -> u64 {
        self.inside.load(Ordering::SeqCst)
    }

    fn entries_count(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    fn exits_count(&self) -> u64 {
        self.exits.load(Ordering::SeqCst)
    }
}

/// Occupancy probe for a reader-writer section.
#[derive(Debug, Default)]
pub struct RwProbe {
    steps: Steps,
    readers: AtomicU64,
    writers: AtomicU64,
    readers_max: AtomicU64,
    writers_max: AtomicU64,
    entries: AtomicU64,
    exits: AtomicU64,
    inconsistent: Mutex<Vec<RwObservation>>,
}

impl RwProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&self, step: u64) {
        let observation = RwObservation {
            readers: self.readers.load(Ordering::SeqCst),
            writers: self.writers.load(Ordering::SeqCst),
            step,
        };
        if !observation.is_consistent() {
            lock(&self.inconsistent).push(observation);
        }
    }

    /// Call right after being admitted as a reader.
    pub fn enter_read(&self) {
        let step = self.steps.tick();
        self.entries.fetch_add(1, Ordering::SeqCst);
        let readers = self.readers.fetch_add(1, Ordering::SeqCst) + 1;
        self.readers_max.fetch_max(readers, Ordering::SeqCst);
        self.observe(step);
    }

    /// Call right before leaving as a reader.
    pub fn exit_read(&self) {
        self.steps.tick();
        self.readers.fetch_sub(1, Ordering::SeqCst);
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    /// Call right after being admitted as the writer.
    pub fn enter_write(&self) {
        let step = self.steps.tick();
        self.entries.fetch_add(1, Ordering::SeqCst);
        let writers = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.writers_max.fetch_max(writers, Ordering::SeqCst);
        self.observe(step);
    }

    /// Call right before leaving as the writer.
    pub fn exit_write(&self) {
        self.steps.tick();
        self.writers.fetch_sub(1, Ordering::SeqCst);
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn read_section<R>(&self, body: impl FnOnce() -> R) -> R {
        self.enter_read();
        let result = body();
        self.exit_read();
        result
    }

    pub fn write_section<R>(&self, body: impl FnOnce() -> R) -> R {
        self.enter_write();
        let result = body();
        self.exit_write();
        result
    }
}

impl RwLockProperties for RwProbe {
    fn inconsistent_observations(&self) -> Vec<RwObservation> {
        lock(&self.inconsistent).clone()
    }

    fn writers_max(&self) -> u64 {
        self.writers_max.load(Ordering::SeqCst)
    }

    fn readers_max(&self) -> u64 {
        self.readers_max.load(Ordering::SeqCst)
    }

    fn entries_count(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    fn exits_count(&self) -> u64 {
        self.exits.load(Ordering::SeqCst)
    }

    fn occupants_now(&self) -> u64 {
        self.readers.load(Ordering::SeqCst) + self.writers.load(Ordering::SeqCst)
    }
}

/// Records fire and wait operations on a one-shot signal.
#[derive(Debug, Default)]
pub struct SignalRecorder {
    steps: Steps,
    history: Mutex<SignalHistory>,
}

impl SignalRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a fire operation. `fire` returns whether the fire was accepted.
    pub fn fire(&self, task_id: u64, fire: impl FnOnce() -> bool) -> bool {
        let started = self.steps.tick();
        let accepted = fire();
        let completed = self.steps.tick();
        lock(&self.history).record_fire(task_id, accepted, started, completed);
        accepted
    }

    /// Run a wait operation. `wait` returns whether it observed the fire.
    pub fn wait(&self, task_id: u64, wait: impl FnOnce() -> bool) -> bool {
        let started = self.steps.tick();
        let observed = wait();
        let completed = self.steps.tick();
        lock(&self.history).record_wait(task_id, observed, started, completed);
        observed
    }
}

impl SignalProperties for SignalRecorder {
    fn history(&self) -> SignalHistory {
        lock(&self.history).clone()
    }
}

/// Records initializer runs and the instances callers received.
#[derive(Debug, Default)]
pub struct InitRecorder {
    runs: AtomicU64,
    callers: AtomicU64,
    instances: Mutex<HashSet<usize>>,
}

impl InitRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call from inside the initializer.
    pub fn note_init(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    /// Call with the instance a caller received.
    pub fn note_caller<T>(&self, instance: &T) {
        self.callers.fetch_add(1, Ordering::SeqCst);
        lock(&self.instances).insert(instance as *const T as usize);
    }
}

impl InitOnceProperties for InitRecorder {
    fn initializer_runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    fn callers_count(&self) -> u64 {
        self.callers.load(Ordering::SeqCst)
    }

    fn observed_instances(&self) -> HashSet<usize> {
        lock(&self.instances).clone()
    }
}

/// Bookkeeping for a counter run: increments issued and the final value.
#[derive(Debug)]
pub struct CounterRun {
    initial: u64,
    issued: AtomicU64,
    observed: AtomicU64,
}

impl CounterRun {
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            initial,
            issued: AtomicU64::new(0),
            observed: AtomicU64::new(initial),
        }
    }

    /// Count one increment issued against the counter.
    pub fn issue(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
    }

    /// Record the counter's value after all tasks finished.
    pub fn observe(&self, value: u64) {
        self.observed.store(value, Ordering::SeqCst);
    }
}

impl CounterProperties for CounterRun {
    fn initial_value(&self) -> u64 {
        self.initial
    }

    fn increments_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    fn observed_value(&self) -> u64 {
        self.observed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vs_core::invariants::{
        CounterPropertyChecker, ExclusionPropertyChecker, InitOncePropertyChecker,
        RwLockPropertyChecker, SignalPropertyChecker,
    };
    use vs_core::PropertyChecker;

    #[test]
    fn test_section_probe_detects_overlap() {
        let probe = SectionProbe::new();
        probe.enter();
        probe.enter();
        probe.exit();
        probe.exit();

        let checker = ExclusionPropertyChecker::new(&probe);
        let violations = checker.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "MutualExclusion");
    }

    #[test]
    fn test_section_probe_clean() {
        let probe = SectionProbe::new();
        for _ in 0..10 {
            probe.section(|| ());
        }
        assert!(ExclusionPropertyChecker::new(&probe).all_hold());
        assert_eq!(probe.entries_count(), 10);
    }

    #[test]
    fn test_rw_probe_detects_reader_writer_overlap() {
        let probe = RwProbe::new();
        probe.enter_read();
        probe.enter_write();
        probe.exit_write();
        probe.exit_read();

        let results = RwLockPropertyChecker::new(&probe).with_seed(5).check_all();
        let xor = results.iter().find(|r| r.name == "ReadersXorWriter").unwrap();
        assert!(!xor.holds);
        assert_eq!(xor.counterexample.as_ref().unwrap().dst_seed, Some(5));
    }

    #[test]
    fn test_rw_probe_shared_readers_ok() {
        let probe = RwProbe::new();
        probe.enter_read();
        probe.enter_read();
        probe.exit_read();
        probe.exit_read();
        probe.write_section(|| ());
        assert!(RwLockPropertyChecker::new(&probe).all_hold());
        assert_eq!(probe.readers_max(), 2);
    }

    #[test]
    fn test_signal_recorder_lost_wakeup() {
        let recorder = SignalRecorder::new();
        recorder.fire(1, || true);
        recorder.wait(2, || false);
        let violations = SignalPropertyChecker::new(&recorder).violations();
        assert!(violations.iter().any(|v| v.name == "NoLostWakeup"));
    }

    #[test]
    fn test_init_recorder() {
        let recorder = InitRecorder::new();
        let value = 5u32;
        recorder.note_init();
        recorder.note_caller(&value);
        recorder.note_caller(&value);
        assert!(InitOncePropertyChecker::new(&recorder).all_hold());

        let other = 5u32;
        recorder.note_caller(&other);
        assert!(!InitOncePropertyChecker::new(&recorder).all_hold());
    }

    #[test]
    fn test_counter_run() {
        let run = CounterRun::new(10);
        for _ in 0..3 {
            run.issue();
        }
        run.observe(13);
        assert!(CounterPropertyChecker::new(&run).all_hold());
        run.observe(12);
        assert!(!CounterPropertyChecker::new(&run).all_hold());
    }
}
