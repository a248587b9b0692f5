//! Fault injection at operation boundaries.
//!
//! Faults never happen inside a primitive. The harness decides, before each
//! operation, whether to stall the calling thread (a short sleep or a
//! yield). Stalls widen race windows so that broken primitives fail quickly
//! and correct ones are exercised under skewed timing.

use std::thread;
use std::time::Duration;

use crate::random::DeterministicRng;

/// Kinds of injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// The thread sleeps for a short, random time.
    Delay,
    /// The thread yields its time slice.
    Yield,
}

/// Fault injection probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Chance of a fault before any operation.
    pub failure_probability: f64,
    /// Among faults, the chance that it is a delay rather than a yield.
    pub delay_fraction: f64,
    /// Longest injected delay in microseconds.
    pub delay_max_us: u64,
}

impl FaultConfig {
    /// No faults at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_fraction: 0.0,
            delay_max_us: 0,
        }
    }

    /// Frequent, longer stalls.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.3,
            delay_fraction: 0.5,
            delay_max_us: 500,
        }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.05,
            delay_fraction: 0.3,
            delay_max_us: 100,
        }
    }
}

/// Fault statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub faults_count: u64,
    pub delays_count: u64,
    pub yields_count: u64,
}

/// Seeded fault injector.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "failure_probability out of range: {}",
            config.failure_probability
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Decide whether a fault happens at this boundary.
    pub fn should_fail(&mut self) -> bool {
        if self.config.failure_probability <= 0.0 {
            return false;
        }
        let fail = self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Pick a fault, if any, for this boundary without applying it.
    pub fn next_fault(&mut self) -> Option<FaultType> {
        if !self.should_fail() {
            return None;
        }
        if self.config.delay_max_us > 0 && self.rng.gen_bool(self.config.delay_fraction) {
            self.stats.delays_count += 1;
            Some(FaultType::Delay)
        } else {
            self.stats.yields_count += 1;
            Some(FaultType::Yield)
        }
    }

    /// Pick a fault and apply it to the calling thread.
    pub fn maybe_delay(&mut self) -> Option<FaultType> {
        let fault = self.next_fault()?;
        match fault {
            FaultType::Delay => {
                let us = self.rng.gen_range(1..=self.config.delay_max_us);
                thread::sleep(Duration::from_micros(us));
            }
            FaultType::Yield => thread::yield_now(),
        }
        Some(fault)
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fails() {
        let mut f = FaultInjector::new(DeterministicRng::new(1), FaultConfig::none());
        for _ in 0..1000 {
            assert!(f.maybe_delay().is_none());
        }
        assert_eq!(f.stats().faults_count, 0);
    }

    #[test]
    fn test_faults_are_deterministic() {
        let pick = |seed| {
            let mut f = FaultInjector::new(DeterministicRng::new(seed), FaultConfig::aggressive());
            (0..200).map(|_| f.next_fault()).collect::<Vec<_>>()
        };
        assert_eq!(pick(9), pick(9));
    }

    #[test]
    fn test_stats_add_up() {
        let mut f = FaultInjector::new(DeterministicRng::new(3), FaultConfig::aggressive());
        for _ in 0..500 {
            f.next_fault();
        }
        let stats = f.stats();
        assert!(stats.faults_count > 0);
        assert_eq!(stats.faults_count, stats.delays_count + stats.yields_count);
    }
}
