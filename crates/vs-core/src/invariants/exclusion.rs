//! Mutual exclusion invariants, shared by `Mutex` and `SpinLock`.
//!
//! | Property | Description |
//! |----------|-------------|
//! | MutualExclusion | At most one task inside the critical section at any instant |
//! | BalancedSections | Every entry is matched by an exit, or is still inside |

use crate::counterexample::{Counterexample, Hazard};
use crate::property::{PropertyChecker, PropertyResult};

/// Instrumentation of a critical section.
pub trait ExclusionProperties {
    /// Largest number of tasks ever observed inside the section at once.
    fn holders_max(&self) -> u64;

    /// Step at which `holders_max` was first observed.
    fn holders_max_step(&self) -> u64;

    /// Tasks inside the section right now.
    fn holders_now(&self) -> u64;

    /// Total entries into the section.
    fn entries_count(&self) -> u64;

    /// Total exits from the section.
    fn exits_count(&self) -> u64;
}

/// Property checker for exclusive critical sections.
pub struct ExclusionPropertyChecker<'a, T: ExclusionProperties> {
    section: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: ExclusionProperties> ExclusionPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(section: &'a T) -> Self {
        Self {
            section,
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

    /// MutualExclusion
    fn check_mutual_exclusion(&self) -> PropertyResult {
        let holders = self.section.holders_max();
        if holders > 1 {
            let step = self.section.holders_max_step();
            let mut ce = match self.dst_seed {
                Some(seed) => Counterexample::with_seed(seed),
                None => Counterexample::new(),
            };
            ce.add_hazard(Hazard::OverlappingHolders { holders, step });

            return PropertyResult::fail(
                "MutualExclusion",
                format!("{} tasks inside the critical section at step {}", holders, step),
                Some(ce),
            );
        }

        PropertyResult::pass("MutualExclusion")
    }

    /// BalancedSections
    fn check_balanced(&self) -> PropertyResult {
        let entries = self.section.entries_count();
        let exits = self.section.exits_count();
        let now = self.section.holders_now();

        if entries != exits + now {
            return PropertyResult::fail(
                "BalancedSections",
                format!(
                    "entries={} exits={} inside={} do not add up",
                    entries, exits, now
                ),
                None,
            );
        }

        PropertyResult::pass("BalancedSections")
    }
}

impl<T: ExclusionProperties> PropertyChecker for ExclusionPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![self.check_mutual_exclusion(), self.check_balanced()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Section {
        max: u64,
        now: u64,
        entries: u64,
        exits: u64,
    }

    impl ExclusionProperties for Section {
        fn holders_max(&self) -> u64 {
            self.max
        }

        fn holders_max_step(&self) -> u64 {
            17
        }

        fn holders_now(&self) -> u64 {
            self.now
        }

        fn entries_count(&self) -> u64 {
            self.entries
        }

        fn exits_count(&self) -> u64 {
            self.exits
        }
    }

    #[test]
    fn test_exclusive_section_passes() {
        let section = Section {
            max: 1,
            now: 0,
            entries: 40,
            exits: 40,
        };
        assert!(ExclusionPropertyChecker::new(&section).all_hold());
    }

    #[test]
    fn test_overlap_detected() {
        let section = Section {
            max: 2,
            now: 0,
            entries: 40,
            exits: 40,
        };
        let checker = ExclusionPropertyChecker::new(&section);
        let results = checker.check_all();
        let mutex = results.iter().find(|r| r.name == "MutualExclusion").unwrap();
        assert!(!mutex.holds);
        assert!(mutex.violation.as_ref().unwrap().contains("step 17"));
    }

    #[test]
    fn test_unbalanced_detected() {
        let section = Section {
            max: 1,
            now: 0,
            entries: 40,
            exits: 39,
        };
        let violations = ExclusionPropertyChecker::new(&section).violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "BalancedSections");
    }
}
