//! Per-thread DST environment: seed, randomness, faults and (for simulated
//! runs) the scheduler.

use crate::fault::{FaultConfig, FaultInjector, FaultType};
use crate::random::{derive_seed, DeterministicRng};
use crate::scheduler::Scheduler;

/// Stream numbers reserved for the environment's own generators.
const FAULT_STREAM: u64 = u64::MAX;
const SCHEDULER_STREAM: u64 = u64::MAX - 1;

#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    /// Environment with default fault injection.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            seed,
            rng: DeterministicRng::new(seed),
            fault: FaultInjector::new(
                DeterministicRng::new(derive_seed(seed, FAULT_STREAM)),
                fault_config,
            ),
            scheduler: None,
        }
    }

    /// Environment that also schedules `threads_count` simulated threads.
    #[must_use]
    pub fn with_scheduler(
        seed: u64,
        threads_count: usize,
        yield_probability: f64,
        fault_config: FaultConfig,
    ) -> Self {
        let mut env = Self::with_fault_config(seed, fault_config);
        env.scheduler = Some(Scheduler::new(
            DeterministicRng::new(derive_seed(seed, SCHEDULER_STREAM)),
            threads_count,
            yield_probability,
        ));
        env
    }

    /// Environment for real thread `thread` of a run seeded with `seed`.
    #[must_use]
    pub fn for_thread(seed: u64, thread: usize, fault_config: FaultConfig) -> Self {
        Self::with_fault_config(derive_seed(seed, thread as u64), fault_config)
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Fault point: maybe stall the calling thread.
    pub fn maybe_delay(&mut self) -> Option<FaultType> {
        self.fault.maybe_delay()
    }

    /// `DST_SEED=<seed>` line for reproduction messages.
    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }
}
