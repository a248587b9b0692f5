//! One-shot signal invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | SingleFire | The UNFIRED -> FIRED transition happens at most once |
//! | NoLostWakeup | A wait that starts after the fire completed observes FIRED |
//! | FiredIsPermanent | Once any waiter observed FIRED, no later wait observes UNFIRED |

use crate::counterexample::{Counterexample, Hazard, TaskAction};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any one-shot signal must satisfy.
pub trait SignalProperties {
    /// Recorded fire/wait history.
    /// Returns owned data to avoid lifetime issues with internal mutexes.
    fn history(&self) -> SignalHistory;
}

/// History of signal operations.
#[derive(Debug, Clone, Default)]
pub struct SignalHistory {
    /// Events in completion order
    pub events: Vec<SignalEvent>,
}

/// A single completed signal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    /// Task that performed the operation
    pub task_id: u64,
    /// What happened
    pub kind: SignalEventKind,
    /// Step at which the operation started
    pub started_step: u64,
    /// Step at which the operation completed
    pub completed_step: u64,
}

/// Kind of signal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEventKind {
    /// `fire()` call; `accepted` is false for an ignored or rejected repeat
    Fire { accepted: bool },
    /// A wait returned; `observed_fired` is false for predicate or timeout exits
    Wait { observed_fired: bool },
}

impl SignalHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Record a fire.
    pub fn record_fire(&mut self, task_id: u64, accepted: bool, started_step: u64, completed_step: u64) {
        debug_assert!(started_step <= completed_step, "Fire must complete after it starts");
        self.events.push(SignalEvent {
            task_id,
            kind: SignalEventKind::Fire { accepted },
            started_step,
            completed_step,
        });
    }

    /// Record a completed wait.
    pub fn record_wait(
        &mut self,
        task_id: u64,
        observed_fired: bool,
        started_step: u64,
        completed_step: u64,
    ) {
        debug_assert!(started_step <= completed_step, "Wait must complete after it starts");
        self.events.push(SignalEvent {
            task_id,
            kind: SignalEventKind::Wait { observed_fired },
            started_step,
            completed_step,
        });
    }

    /// The accepted fire, if any.
    #[must_use]
    pub fn accepted_fire(&self) -> Option<&SignalEvent> {
        self.events
            .iter()
            .find(|e| e.kind == SignalEventKind::Fire { accepted: true })
    }

    fn waits(&self) -> impl Iterator<Item = &SignalEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, SignalEventKind::Wait { .. }))
    }
}

/// Property checker for one-shot signals.
pub struct SignalPropertyChecker<'a, T: SignalProperties> {
    signal: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: SignalProperties> SignalPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(signal: &'a T) -> Self {
        Self {
            signal,
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

    /// SingleFire
    fn check_single_fire(&self, history: &SignalHistory) -> PropertyResult {
        let accepted = history
            .events
            .iter()
            .filter(|e| e.kind == SignalEventKind::Fire { accepted: true })
            .count();

        if accepted > 1 {
            return PropertyResult::fail(
                "SingleFire",
                format!("signal transitioned to FIRED {} times", accepted),
                None,
            );
        }

        PropertyResult::pass("SingleFire")
    }

    /// NoLostWakeup
    ///
    /// Only waits that started strictly after the accepted fire completed
    /// are constrained; earlier waits may legitimately time out.
    fn check_no_lost_wakeup(&self, history: &SignalHistory) -> PropertyResult {
        let Some(fire) = history.accepted_fire() else {
            return PropertyResult::pass("NoLostWakeup");
        };

        let lost = history.waits().find(|w| {
            w.started_step > fire.completed_step
                && w.kind == SignalEventKind::Wait { observed_fired: false }
        });

        if let Some(wait) = lost {
            let mut ce = match self.dst_seed {
                Some(seed) => Counterexample::with_seed(seed),
                None => Counterexample::new(),
            };
            ce.add_action(TaskAction {
                task_id: fire.task_id,
                step: fire.completed_step,
                action: "fire".to_string(),
                success: true,
            });
            ce.add_action(TaskAction {
                task_id: wait.task_id,
                step: wait.completed_step,
                action: "wait".to_string(),
                success: false,
            });
            ce.add_hazard(Hazard::LostWakeup {
                task_id: wait.task_id,
                step: wait.started_step,
            });

            return PropertyResult::fail(
                "NoLostWakeup",
                format!(
                    "task {} started waiting at step {} after fire completed at step {} but never observed it",
                    wait.task_id, wait.started_step, fire.completed_step
                ),
                Some(ce),
            );
        }

        PropertyResult::pass("NoLostWakeup")
    }

    /// FiredIsPermanent
    fn check_fired_is_permanent(&self, history: &SignalHistory) -> PropertyResult {
        let first_observed = history
            .waits()
            .filter(|w| w.kind == SignalEventKind::Wait { observed_fired: true })
            .map(|w| w.completed_step)
            .min();

        if let Some(observed_at) = first_observed {
            let reverted = history.waits().find(|w| {
                w.started_step > observed_at
                    && w.kind == SignalEventKind::Wait { observed_fired: false }
            });
            if let Some(wait) = reverted {
                return PropertyResult::fail(
                    "FiredIsPermanent",
                    format!(
                        "task {} observed UNFIRED at step {} after FIRED was observed at step {}",
                        wait.task_id, wait.started_step, observed_at
                    ),
                    None,
                );
            }
        }

        PropertyResult::pass("FiredIsPermanent")
    }
}

impl<T: SignalProperties> PropertyChecker for SignalPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let history = self.signal.history();
        vec![
            self.check_single_fire(&history),
            self.check_no_lost_wakeup(&history),
            self.check_fired_is_permanent(&history),
        ]
    }
}
