//! Mutex acquisition protocol.
//!
//! Each task acquires the lock once, runs its critical section and releases.
//!
//! # Variants
//!
//! - `TestAndSet`: checking the lock and taking it is one atomic step (the
//!   compare-exchange / state-mutex path of `RawMutex` and `RawSpinLock`).
//! - `CheckThenSet`: a task observes the lock free, and takes it in a later
//!   step. Another task can slip in between.
//!
//! # Invariants
//!
//! 1. `mutual exclusion`: at most one task is in its critical section
//! 2. `critical section reachable` (sometimes): some task gets in

use stateright::{Model, Property};

use crate::trace::{task_number, ModelAction};

/// How a task takes the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexVariant {
    TestAndSet,
    CheckThenSet,
}

/// Where a task is in its single pass through the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexPhase {
    Idle,
    /// Saw the lock free but has not taken it yet
    SawFree,
    Critical,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutexState {
    pub locked: bool,
    pub phases: Vec<MutexPhase>,
}

impl MutexState {
    /// Tasks currently in their critical section.
    pub fn holders(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| **p == MutexPhase::Critical)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexAction {
    /// Atomic test-and-set
    Acquire(usize),
    /// Observe the lock word
    Check(usize),
    /// Store "locked" after a successful check
    Set(usize),
    Release(usize),
}

impl ModelAction for MutexAction {
    fn task(&self) -> u64 {
        match self {
            MutexAction::Acquire(t)
            | MutexAction::Check(t)
            | MutexAction::Set(t)
            | MutexAction::Release(t) => task_number(*t),
        }
    }

    fn label(&self) -> String {
        match self {
            MutexAction::Acquire(_) => "acquire",
            MutexAction::Check(_) => "check",
            MutexAction::Set(_) => "set",
            MutexAction::Release(_) => "release",
        }
        .to_string()
    }
}

/// Model of `tasks_count` tasks contending for one lock.
#[derive(Debug, Clone)]
pub struct MutexModel {
    pub tasks_count: usize,
    pub variant: MutexVariant,
}

impl MutexModel {
    pub fn new(tasks_count: usize, variant: MutexVariant) -> Self {
        Self {
            tasks_count,
            variant,
        }
    }
}

impl Model for MutexModel {
    type State = MutexState;
    type Action = MutexAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![MutexState {
            locked: false,
            phases: vec![MutexPhase::Idle; self.tasks_count],
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (t, phase) in state.phases.iter().enumerate() {
            match (phase, self.variant) {
                (MutexPhase::Idle, MutexVariant::TestAndSet) if !state.locked => {
                    actions.push(MutexAction::Acquire(t));
                }
                (MutexPhase::Idle, MutexVariant::CheckThenSet) if !state.locked => {
                    actions.push(MutexAction::Check(t));
                }
                (MutexPhase::SawFree, _) => actions.push(MutexAction::Set(t)),
                (MutexPhase::Critical, _) => actions.push(MutexAction::Release(t)),
                _ => {}
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            MutexAction::Acquire(t) => {
                if state.locked {
                    return None;
                }
                state.locked = true;
                state.phases[t] = MutexPhase::Critical;
            }
            MutexAction::Check(t) => {
                if state.locked {
                    return None;
                }
                state.phases[t] = MutexPhase::SawFree;
            }
            MutexAction::Set(t) => {
                // BUG: stores without re-checking
                state.locked = true;
                state.phases[t] = MutexPhase::Critical;
            }
            MutexAction::Release(t) => {
                state.phases[t] = MutexPhase::Done;
                state.locked = state.holders() > 0;
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("mutual exclusion", |_, state: &MutexState| {
                state.holders() <= 1
            }),
            Property::sometimes("critical section reachable", |_, state: &MutexState| {
                state.holders() == 1
            }),
        ]
    }
}
