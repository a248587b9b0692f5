//! Reader-writer lock invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | ReadersXorWriter | Never readers and a writer inside at the same time |
//! | SingleWriter | At most one writer inside at any instant |
//! | BalancedSections | Every read/write entry is matched by an exit or still inside |

use crate::counterexample::{Counterexample, Hazard};
use crate::property::{PropertyChecker, PropertyResult};

/// Occupancy of a reader-writer section observed at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwObservation {
    /// Readers inside
    pub readers: u64,
    /// Writers inside
    pub writers: u64,
    /// Step number for ordering
    pub step: u64,
}

impl RwObservation {
    /// Whether this observation satisfies both exclusion invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        readers_xor_writer(self.readers, self.writers > 0) && self.writers <= 1
    }
}

/// `writer_active` implies no readers, and readers imply no writer.
#[must_use]
pub fn readers_xor_writer(readers: u64, writer_active: bool) -> bool {
    !(writer_active && readers > 0)
}

/// Instrumentation of a reader-writer section.
pub trait RwLockProperties {
    /// Observations that broke an invariant (typically empty).
    fn inconsistent_observations(&self) -> Vec<RwObservation>;

    /// Largest number of concurrent writers ever observed.
    fn writers_max(&self) -> u64;

    /// Largest number of concurrent readers ever observed.
    fn readers_max(&self) -> u64;

    /// Read and write entries so far.
    fn entries_count(&self) -> u64;

    /// Read and write exits so far.
    fn exits_count(&self) -> u64;

    /// Readers plus writers inside right now.
    fn occupants_now(&self) -> u64;
}

/// Property checker for reader-writer locks.
pub struct RwLockPropertyChecker<'a, T: RwLockProperties> {
    lock: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: RwLockProperties> RwLockPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(lock: &'a T) -> Self {
        Self {
            lock,
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

    /// ReadersXorWriter
    fn check_readers_xor_writer(&self) -> PropertyResult {
        let overlaps: Vec<RwObservation> = self
            .lock
            .inconsistent_observations()
            .into_iter()
            .filter(|o| !readers_xor_writer(o.readers, o.writers > 0))
            .collect();

        if let Some(first) = overlaps.first() {
            let mut ce = match self.dst_seed {
                Some(seed) => Counterexample::with_seed(seed),
                None => Counterexample::new(),
            };
            for o in &overlaps {
                ce.add_hazard(Hazard::ReaderWriterOverlap {
                    readers: o.readers,
                    writers: o.writers,
                    step: o.step,
                });
            }

            return PropertyResult::fail(
                "ReadersXorWriter",
                format!(
                    "{} readers alongside {} writers at step {} ({} overlaps total)",
                    first.readers,
                    first.writers,
                    first.step,
                    overlaps.len()
                ),
                Some(ce),
            );
        }

        PropertyResult::pass("ReadersXorWriter")
    }

    /// SingleWriter
    fn check_single_writer(&self) -> PropertyResult {
        let writers = self.lock.writers_max();
        if writers > 1 {
            return PropertyResult::fail(
                "SingleWriter",
                format!("{} writers inside at once", writers),
                None,
            );
        }

        PropertyResult::pass("SingleWriter")
    }

    /// BalancedSections
    fn check_balanced(&self) -> PropertyResult {
        let entries = self.lock.entries_count();
        let exits = self.lock.exits_count();
        let now = self.lock.occupants_now();

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

impl<T: RwLockProperties> PropertyChecker for RwLockPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_readers_xor_writer(),
            self.check_single_writer(),
            self.check_balanced(),
        ]
    }
}
