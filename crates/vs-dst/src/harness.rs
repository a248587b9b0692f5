//! DST test harness for running reproducible concurrent tests.
//!
//! Two ways to run a workload:
//!
//! - `run_concurrent` simulates several logical threads on the calling OS
//!   thread. The interleaving is chosen by the seeded scheduler, so a run is
//!   fully reproducible. Only non-blocking operations (try-acquire, fire,
//!   increments) make sense here.
//! - `run_threads` runs one real OS thread per logical thread. Operation
//!   choices and injected stalls are seeded per thread; the OS still decides
//!   the exact interleaving. Use it for blocking operations.
//!
//! Both stop at the first violation and report it with the seed.

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Barrier, Mutex, PoisonError};
use std::thread;

use serde::Serialize;

use crate::env::DstEnv;
use crate::fault::FaultConfig;
use crate::scheduler::ScheduleDecision;

/// Upper bound on logical threads in one run.
const THREADS_COUNT_MAX: usize = 64;

/// Configuration for DST test harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of threads to run (real or simulated)
    pub threads_count: usize,
    /// Number of operations per thread
    pub operations_per_thread: u64,
    /// Probability of a context switch at each simulated yield point
    pub yield_probability: f64,
    /// Fault injection configuration
    pub fault_config: FaultConfig,
    /// Check invariants after every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 200,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    /// Configuration for stress testing.
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 2_000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    /// Configuration for quick testing.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }

    /// Apply `DST_THREADS` and `DST_ITERATIONS` overrides, if set and valid.
    #[must_use]
    pub fn from_env(self) -> Self {
        let mut config = self;
        if let Some(threads) = env_number("DST_THREADS") {
            config.threads_count = (threads as usize).clamp(1, THREADS_COUNT_MAX);
        }
        if let Some(iterations) = env_number("DST_ITERATIONS") {
            config.operations_per_thread = iterations;
        }
        config
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

/// Result of running the harness.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessResult {
    /// Seed used for reproduction
    pub seed: u64,
    /// Threads that took part
    pub threads_count: usize,
    /// Total operations executed
    pub operations_count: u64,
    /// Simulated context switches (zero for real threads)
    pub context_switches_count: u64,
    /// Faults injected
    pub faults_injected_count: u64,
    /// Invariant checks performed
    pub invariant_checks_count: u64,
    /// Whether all invariants held
    pub all_invariants_held: bool,
    /// First violation (if any)
    pub first_violation: Option<String>,
}

impl HarnessResult {
    /// Format for display.
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held {
            "PASS"
        } else {
            "FAIL"
        };

        let mut result = format!(
            "[{}] DST_SEED={} threads={} ops={} switches={} faults={} checks={}",
            status,
            self.seed,
            self.threads_count,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        );

        if let Some(ref violation) = self.first_violation {
            result.push_str(&format!("\n  Violation: {}", violation));
        }

        result
    }

    /// Machine-readable form for result archives.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// DST test harness.
pub struct DstHarness {
    seed: u64,
    config: HarnessConfig,
    operations_count: AtomicU64,
    context_switches_count: AtomicU64,
    faults_injected_count: AtomicU64,
    invariant_checks_count: AtomicU64,
    violation: Mutex<Option<String>>,
    stopped: AtomicBool,
}

impl DstHarness {
    /// Create a new harness with the given seed and config.
    #[must_use]
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(config.threads_count > 0, "Must have at least one thread");
        debug_assert!(
            config.threads_count <= THREADS_COUNT_MAX,
            "Too many threads for DST: {}",
            config.threads_count
        );

        Self {
            seed,
            config,
            operations_count: AtomicU64::new(0),
            context_switches_count: AtomicU64::new(0),
            faults_injected_count: AtomicU64::new(0),
            invariant_checks_count: AtomicU64::new(0),
            violation: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Get the seed for reproduction.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Check if the harness has been stopped due to a violation.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the harness with a violation message. The first message wins.
    pub fn stop_with_violation(&self, message: String) {
        let mut guard = self.violation.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            log::debug!("DST_SEED={} violation: {}", self.seed, message);
            *guard = Some(message);
        }
        self.stopped.store(true, Ordering::Release);
    }

    fn record_operation(&self) -> u64 {
        self.operations_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn should_check_invariants(&self, operations_done: u64) -> bool {
        let interval = self.config.invariant_check_interval;
        interval != 0 && operations_done % interval == 0
    }

    fn check(&self, check_invariants: &mut impl FnMut() -> Result<(), String>) -> bool {
        self.invariant_checks_count.fetch_add(1, Ordering::Relaxed);
        match check_invariants() {
            Ok(()) => true,
            Err(e) => {
                self.stop_with_violation(e);
                false
            }
        }
    }

    /// Run a simulated concurrent test.
    ///
    /// `generate_op` picks the next operation for a thread at a step
    /// (`None` skips the step); `execute` performs it. Operations are
    /// interleaved according to the seeded scheduler.
    pub fn run_concurrent<F, T, R, I>(
        &self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<(), String>,
        I: FnMut() -> Result<(), String>,
    {
        let threads_count = self.config.threads_count;
        let ops_per_thread = self.config.operations_per_thread;
        let mut env = DstEnv::with_scheduler(
            self.seed,
            threads_count,
            self.config.yield_probability,
            FaultConfig::none(),
        );
        let mut thread_steps = vec![0u64; threads_count];

        loop {
            let current = match env.scheduler() {
                Some(scheduler) => scheduler.current_thread(),
                None => 0,
            };

            if thread_steps[current] >= ops_per_thread {
                let all_done = match env.scheduler() {
                    Some(scheduler) => {
                        scheduler.mark_finished(current);
                        scheduler.all_finished()
                    }
                    None => true,
                };
                if all_done {
                    break;
                }
                self.yield_point(&mut env);
                continue;
            }

            let step = thread_steps[current];
            thread_steps[current] += 1;

            if let Some(op) = generate_op(&mut env, current, step) {
                if let Err(e) = execute(&mut env, current, op) {
                    self.stop_with_violation(format!("Thread {}: {}", current, e));
                    break;
                }
                let done = self.record_operation();
                if self.should_check_invariants(done) && !self.check(&mut check_invariants) {
                    break;
                }
            }

            self.yield_point(&mut env);
        }

        if !self.is_stopped() {
            self.check(&mut check_invariants);
        }

        self.build_result()
    }

    fn yield_point(&self, env: &mut DstEnv) {
        if let Some(scheduler) = env.scheduler() {
            if scheduler.decide() != ScheduleDecision::Continue {
                self.context_switches_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Run one real OS thread per configured thread.
    ///
    /// Each thread gets its own `DstEnv` derived from the harness seed. Before
    /// every operation the thread passes a fault point that may stall it.
    /// All threads start together. `check_invariants` runs once, after every
    /// thread has finished.
    pub fn run_threads<R, I>(&self, execute: R, mut check_invariants: I) -> HarnessResult
    where
        R: Fn(&mut DstEnv, usize, u64) -> Result<(), String> + Sync,
        I: FnMut() -> Result<(), String>,
    {
        let threads_count = self.config.threads_count;
        let start = Barrier::new(threads_count);

        thread::scope(|scope| {
            for thread_index in 0..threads_count {
                let execute = &execute;
                let start = &start;
                scope.spawn(move || {
                    let mut env = DstEnv::for_thread(
                        self.seed,
                        thread_index,
                        self.config.fault_config,
                    );
                    start.wait();

                    for step in 0..self.config.operations_per_thread {
                        if self.is_stopped() {
                            break;
                        }
                        env.maybe_delay();
                        if let Err(e) = execute(&mut env, thread_index, step) {
                            self.stop_with_violation(format!("Thread {}: {}", thread_index, e));
                            break;
                        }
                        self.record_operation();
                    }

                    self.faults_injected_count
                        .fetch_add(env.fault().stats().faults_count, Ordering::Relaxed);
                });
            }
        });

        if !self.is_stopped() {
            self.check(&mut check_invariants);
        }

        self.build_result()
    }

    fn build_result(&self) -> HarnessResult {
        let violation = self
            .violation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        HarnessResult {
            seed: self.seed,
            threads_count: self.config.threads_count,
            operations_count: self.operations_count.load(Ordering::Relaxed),
            context_switches_count: self.context_switches_count.load(Ordering::Relaxed),
            faults_injected_count: self.faults_injected_count.load(Ordering::Relaxed),
            invariant_checks_count: self.invariant_checks_count.load(Ordering::Relaxed),
            all_invariants_held: violation.is_none(),
            first_violation: violation,
        }
    }
}
