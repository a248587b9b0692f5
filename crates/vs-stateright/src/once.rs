//! Lazy initialization protocol.
//!
//! Each task asks for the value once. The fast path reads the initialized
//! flag; the slow path takes the lock.
//!
//! # Variants
//!
//! - `DoubleChecked`: the flag is checked again under the lock (`InitOnce`)
//! - `SingleChecked`: the lock holder initializes unconditionally
//!   (`SingleCheckLazy`)
//!
//! # Invariants
//!
//! 1. `exactly once`: the initializer runs at most once, and exactly once
//!    when every task is done
//! 2. `fast path taken` (sometimes): a task returns without the lock

use stateright::{Model, Property};

use crate::trace::{task_number, ModelAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitVariant {
    DoubleChecked,
    SingleChecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitPhase {
    Start,
    /// Saw the flag unset, needs the lock
    Slow,
    Locked,
    /// Returned via the fast path
    DoneFast,
    DoneSlow,
}

impl InitPhase {
    fn is_done(self) -> bool {
        matches!(self, InitPhase::DoneFast | InitPhase::DoneSlow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitState {
    pub initialized: bool,
    pub lock_holder: Option<usize>,
    pub runs: u8,
    pub tasks: Vec<InitPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitAction {
    /// Read the flag
    Check(usize),
    Lock(usize),
    /// Under the lock: maybe run the initializer, then unlock
    Finish(usize),
}

impl ModelAction for InitAction {
    fn task(&self) -> u64 {
        match self {
            InitAction::Check(t) | InitAction::Lock(t) | InitAction::Finish(t) => task_number(*t),
        }
    }

    fn label(&self) -> String {
        match self {
            InitAction::Check(_) => "check",
            InitAction::Lock(_) => "lock",
            InitAction::Finish(_) => "init+unlock",
        }
        .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct InitModel {
    pub tasks_count: usize,
    pub variant: InitVariant,
}

impl InitModel {
    pub fn new(tasks_count: usize, variant: InitVariant) -> Self {
        Self {
            tasks_count,
            variant,
        }
    }
}

impl Model for InitModel {
    type State = InitState;
    type Action = InitAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![InitState {
            initialized: false,
            lock_holder: None,
            runs: 0,
            tasks: vec![InitPhase::Start; self.tasks_count],
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (t, phase) in state.tasks.iter().enumerate() {
            match phase {
                InitPhase::Start => actions.push(InitAction::Check(t)),
                InitPhase::Slow if state.lock_holder.is_none() => {
                    actions.push(InitAction::Lock(t));
                }
                InitPhase::Locked => actions.push(InitAction::Finish(t)),
                _ => {}
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            InitAction::Check(t) => {
                state.tasks[t] = if state.initialized {
                    InitPhase::DoneFast
                } else {
                    InitPhase::Slow
                };
            }
            InitAction::Lock(t) => {
                if state.lock_holder.is_some() {
                    return None;
                }
                state.lock_holder = Some(t);
                state.tasks[t] = InitPhase::Locked;
            }
            InitAction::Finish(t) => {
                let recheck = self.variant == InitVariant::DoubleChecked;
                if !(recheck && state.initialized) {
                    state.runs += 1;
                    state.initialized = true;
                }
                state.lock_holder = None;
                state.tasks[t] = InitPhase::DoneSlow;
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("exactly once", |_, state: &InitState| {
                let all_done = state.tasks.iter().all(|p| p.is_done());
                state.runs <= 1 && (!all_done || state.runs == 1)
            }),
            Property::sometimes("fast path taken", |_, state: &InitState| {
                state.tasks.contains(&InitPhase::DoneFast)
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(model: &InitModel, actions: &[InitAction]) -> InitState {
        let mut state = model.init_states().remove(0);
        for action in actions {
            state = model.next_state(&state, *action).unwrap();
        }
        state
    }

    const RACE: [InitAction; 6] = [
        InitAction::Check(0),
        InitAction::Check(1),
        InitAction::Lock(0),
        InitAction::Finish(0),
        InitAction::Lock(1),
        InitAction::Finish(1),
    ];

    #[test]
    fn test_recheck_prevents_second_run() {
        let state = run(&InitModel::new(2, InitVariant::DoubleChecked), &RACE);
        assert_eq!(state.runs, 1);
        assert_eq!(state.tasks, vec![InitPhase::DoneSlow; 2]);
    }

    #[test]
    fn test_single_check_runs_twice() {
        let state = run(&InitModel::new(2, InitVariant::SingleChecked), &RACE);
        assert_eq!(state.runs, 2);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let model = InitModel::new(2, InitVariant::DoubleChecked);
        let state = run(&model, &RACE[..3]);
        assert!(model.next_state(&state, InitAction::Lock(1)).is_none());
    }
}
