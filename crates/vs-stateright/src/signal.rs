//! One-shot signal wait/fire protocol.
//!
//! One firer and several waiters. Firing wakes every waiter blocked at that
//! moment; a waiter that blocks afterwards is only woken if it checks the
//! fired flag first.
//!
//! # Variants
//!
//! - `Flagged`: a waiter checks the flag and blocks in one step, under the
//!   same lock the firer takes (`OneShotSignal`).
//! - `Naive`: a waiter blocks on the condition variable without a flag
//!   (`NaiveSignal`). A fire that happens first is lost.
//!
//! # Invariants
//!
//! 1. `no lost wakeup`: once fired, no waiter is left blocked
//! 2. `single fire`: the flag is set at most once
//! 3. `waiter observes fire` (sometimes)

use stateright::{Model, Property};

use crate::trace::{task_number, ModelAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalVariant {
    Flagged,
    Naive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaiterPhase {
    Idle,
    Blocked,
    Observed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalState {
    pub fired: bool,
    pub fires_count: u8,
    pub waiters: Vec<WaiterPhase>,
}

/// The firer is task 1; waiter `w` is task `w + 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalAction {
    Fire,
    /// Check the flag (flagged variant) and block if unset
    Wait(usize),
}

impl ModelAction for SignalAction {
    fn task(&self) -> u64 {
        match self {
            SignalAction::Fire => task_number(0),
            SignalAction::Wait(w) => task_number(w + 1),
        }
    }

    fn label(&self) -> String {
        match self {
            SignalAction::Fire => "fire",
            SignalAction::Wait(_) => "wait",
        }
        .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SignalModel {
    pub waiters_count: usize,
    pub variant: SignalVariant,
}

impl SignalModel {
    pub fn new(waiters_count: usize, variant: SignalVariant) -> Self {
        Self {
            waiters_count,
            variant,
        }
    }
}

impl Model for SignalModel {
    type State = SignalState;
    type Action = SignalAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![SignalState {
            fired: false,
            fires_count: 0,
            waiters: vec![WaiterPhase::Idle; self.waiters_count],
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        if state.fires_count == 0 {
            actions.push(SignalAction::Fire);
        }
        for (w, phase) in state.waiters.iter().enumerate() {
            if *phase == WaiterPhase::Idle {
                actions.push(SignalAction::Wait(w));
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            SignalAction::Fire => {
                state.fires_count += 1;
                // only the flagged variant remembers the fire
                state.fired = self.variant == SignalVariant::Flagged;
                for phase in &mut state.waiters {
                    if *phase == WaiterPhase::Blocked {
                        *phase = WaiterPhase::Observed;
                    }
                }
            }
            SignalAction::Wait(w) => {
                state.waiters[w] = if state.fired {
                    WaiterPhase::Observed
                } else {
                    WaiterPhase::Blocked
                };
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("no lost wakeup", |_, state: &SignalState| {
                state.fires_count == 0 || !state.waiters.contains(&WaiterPhase::Blocked)
            }),
            Property::always("single fire", |_, state: &SignalState| {
                state.fires_count <= 1
            }),
            Property::sometimes("waiter observes fire", |_, state: &SignalState| {
                state.waiters.contains(&WaiterPhase::Observed)
            }),
        ]
    }
}
