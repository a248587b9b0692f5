//! Initialize-once invariants (the corrected double-checked locking pattern).
//!
//! | Property | Description |
//! |----------|-------------|
//! | ExactlyOnceInit | The initializer completes exactly once if anyone asked for the value |
//! | SingleInstance | Every caller observes the same instance |

use std::collections::HashSet;

use crate::counterexample::{Counterexample, Hazard};
use crate::property::{PropertyChecker, PropertyResult};

/// Observable state of a lazily initialized value.
pub trait InitOnceProperties {
    /// Number of times the initializer ran to completion.
    fn initializer_runs(&self) -> u64;

    /// Number of callers that asked for the value.
    fn callers_count(&self) -> u64;

    /// Distinct instance addresses handed to callers.
    fn observed_instances(&self) -> HashSet<usize>;
}

/// Property checker for initialize-once cells.
pub struct InitOncePropertyChecker<'a, T: InitOnceProperties> {
    cell: &'a T,
}

impl<'a, T: InitOnceProperties> InitOncePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(cell: &'a T) -> Self {
        Self { cell }
    }

    /// ExactlyOnceInit
    fn check_exactly_once(&self) -> PropertyResult {
        let runs = self.cell.initializer_runs();
        let callers = self.cell.callers_count();
        let expected = u64::from(callers > 0);

        if runs != expected {
            let mut ce = Counterexample::new();
            ce.add_hazard(Hazard::RepeatedInitialization { runs });
            return PropertyResult::fail(
                "ExactlyOnceInit",
                format!(
                    "initializer ran {} times for {} callers (expected {})",
                    runs, callers, expected
                ),
                Some(ce),
            );
        }

        PropertyResult::pass("ExactlyOnceInit")
    }

    /// SingleInstance
    fn check_single_instance(&self) -> PropertyResult {
        let instances = self.cell.observed_instances();
        if instances.len() > 1 {
            return PropertyResult::fail(
                "SingleInstance",
                format!("callers observed {} distinct instances", instances.len()),
                None,
            );
        }

        PropertyResult::pass("SingleInstance")
    }
}

impl<T: InitOnceProperties> PropertyChecker for InitOncePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![self.check_exactly_once(), self.check_single_instance()]
    }
}
