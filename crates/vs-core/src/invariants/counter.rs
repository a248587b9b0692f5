//! Shared counter invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostUpdates | Every issued increment is reflected in the final value |
//! | NoPhantomUpdates | The counter never exceeds initial + issued |

use crate::counterexample::{Counterexample, Hazard};
use crate::property::{PropertyChecker, PropertyResult};

/// Observable state of a counter workload once all tasks have joined.
pub trait CounterProperties {
    /// Value the counter was created with.
    fn initial_value(&self) -> u64;

    /// Total increments issued by all callers.
    fn increments_issued(&self) -> u64;

    /// Value read back after every task joined.
    fn observed_value(&self) -> u64;
}

/// Property checker for counter workloads.
pub struct CounterPropertyChecker<'a, T: CounterProperties> {
    counter: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: CounterProperties> CounterPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(counter: &'a T) -> Self {
        Self {
            counter,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn expected(&self) -> u64 {
        self.counter
            .initial_value()
            .saturating_add(self.counter.increments_issued())
    }

    /// NoLostUpdates
    ///
    /// Under concurrent read-modify-write, interleaved non-atomic updates
    /// overwrite each other and the final value falls short.
    fn check_no_lost_updates(&self) -> PropertyResult {
        let expected = self.expected();
        let observed = self.counter.observed_value();

        if observed < expected {
            let mut ce = match self.dst_seed {
                Some(seed) => Counterexample::with_seed(seed),
                None => Counterexample::new(),
            };
            ce.add_hazard(Hazard::LostUpdate { expected, observed });

            return PropertyResult::fail(
                "NoLostUpdates",
                format!(
                    "{} increments lost: expected {}, observed {}",
                    expected - observed,
                    expected,
                    observed
                ),
                Some(ce),
            );
        }

        PropertyResult::pass("NoLostUpdates")
    }

    /// NoPhantomUpdates
    fn check_no_phantom_updates(&self) -> PropertyResult {
        let expected = self.expected();
        let observed = self.counter.observed_value();

        if observed > expected {
            return PropertyResult::fail(
                "NoPhantomUpdates",
                format!(
                    "counter reads {} but only {} was ever issued",
                    observed, expected
                ),
                None,
            );
        }

        PropertyResult::pass("NoPhantomUpdates")
    }
}

impl<T: CounterProperties> PropertyChecker for CounterPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![self.check_no_lost_updates(), self.check_no_phantom_updates()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Observed {
        initial: u64,
        issued: u64,
        observed: u64,
    }

    impl CounterProperties for Observed {
        fn initial_value(&self) -> u64 {
            self.initial
        }

        fn increments_issued(&self) -> u64 {
            self.issued
        }

        fn observed_value(&self) -> u64 {
            self.observed
        }
    }

    #[test]
    fn test_exact_count_passes() {
        let run = Observed {
            initial: 5,
            issued: 1000,
            observed: 1005,
        };
        assert!(CounterPropertyChecker::new(&run).all_hold());
    }

    #[test]
    fn test_lost_update_detected() {
        let run = Observed {
            initial: 0,
            issued: 200_000,
            observed: 137_412,
        };
        let checker = CounterPropertyChecker::new(&run).with_seed(9);
        let results = checker.check_all();

        let lost = results.iter().find(|r| r.name == "NoLostUpdates").unwrap();
        assert!(!lost.holds);
        assert!(lost.violation.as_ref().unwrap().contains("62588"));

        let ce = lost.counterexample.as_ref().unwrap();
        assert_eq!(ce.dst_seed, Some(9));
        assert_eq!(
            ce.hazards,
            vec![Hazard::LostUpdate {
                expected: 200_000,
                observed: 137_412
            }]
        );
    }

    #[test]
    fn test_phantom_update_detected() {
        let run = Observed {
            initial: 0,
            issued: 10,
            observed: 11,
        };
        let checker = CounterPropertyChecker::new(&run);
        let violations = checker.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "NoPhantomUpdates");
    }
}
