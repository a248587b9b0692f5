//! Reader-writer admission protocol.
//!
//! Readers and writers each make one pass: request, enter, leave. A writer
//! that requested access counts as waiting until it enters, which is what
//! `RwPolicy::WriterPriority` keys on.
//!
//! # Invariants
//!
//! 1. `readers xor writer`: never readers inside together with a writer
//! 2. `single writer`: at most one writer inside
//! 3. `no reader overtakes a waiting writer`: checked for writer priority
//!    only
//! 4. `readers share` (sometimes): two readers inside at once
//! 5. `writer enters` (sometimes)

use stateright::{Model, Property};

use crate::trace::{task_number, ModelAction};

/// Admission rule being modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwModelPolicy {
    WriterPriority,
    ReaderPriority,
    /// Writers are admitted whenever no other writer is inside
    UncheckedWriter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwPhase {
    Idle,
    Waiting,
    Inside,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RwState {
    pub readers: Vec<RwPhase>,
    pub writers: Vec<RwPhase>,
    /// A reader entered while a writer was waiting
    pub overtaken: bool,
}

impl RwState {
    pub fn readers_inside(&self) -> usize {
        count(&self.readers, RwPhase::Inside)
    }

    pub fn writers_inside(&self) -> usize {
        count(&self.writers, RwPhase::Inside)
    }

    pub fn writers_waiting(&self) -> usize {
        count(&self.writers, RwPhase::Waiting)
    }
}

fn count(phases: &[RwPhase], wanted: RwPhase) -> usize {
    phases.iter().filter(|p| **p == wanted).count()
}

/// Indices count readers and writers separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwAction {
    RequestRead(usize),
    EnterRead(usize),
    LeaveRead(usize),
    RequestWrite(usize),
    EnterWrite(usize),
    LeaveWrite(usize),
}

/// Model of `readers_count` readers and `writers_count` writers.
#[derive(Debug, Clone)]
pub struct RwLockModel {
    pub readers_count: usize,
    pub writers_count: usize,
    pub policy: RwModelPolicy,
}

impl RwLockModel {
    pub fn new(readers_count: usize, writers_count: usize, policy: RwModelPolicy) -> Self {
        Self {
            readers_count,
            writers_count,
            policy,
        }
    }

    fn read_admissible(&self, state: &RwState) -> bool {
        if state.writers_inside() > 0 {
            return false;
        }
        match self.policy {
            RwModelPolicy::WriterPriority => state.writers_waiting() == 0,
            RwModelPolicy::ReaderPriority | RwModelPolicy::UncheckedWriter => true,
        }
    }

    fn write_admissible(&self, state: &RwState) -> bool {
        match self.policy {
            RwModelPolicy::UncheckedWriter => state.writers_inside() == 0,
            _ => state.writers_inside() == 0 && state.readers_inside() == 0,
        }
    }

    /// Writer `w` as a task number in diagrams.
    pub fn writer_task(&self, w: usize) -> u64 {
        task_number(self.readers_count + w)
    }
}

/// Task numbering needs the reader count, so actions carry their own
/// position in the combined task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RwStep {
    pub action: RwAction,
    pub task: u64,
}

impl ModelAction for RwStep {
    fn task(&self) -> u64 {
        self.task
    }

    fn label(&self) -> String {
        match self.action {
            RwAction::RequestRead(_) => "req read",
            RwAction::EnterRead(_) => "read",
            RwAction::LeaveRead(_) => "unread",
            RwAction::RequestWrite(_) => "req write",
            RwAction::EnterWrite(_) => "write",
            RwAction::LeaveWrite(_) => "unwrite",
        }
        .to_string()
    }
}

impl Model for RwLockModel {
    type State = RwState;
    type Action = RwStep;

    fn init_states(&self) -> Vec<Self::State> {
        vec![RwState {
            readers: vec![RwPhase::Idle; self.readers_count],
            writers: vec![RwPhase::Idle; self.writers_count],
            overtaken: false,
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (r, phase) in state.readers.iter().enumerate() {
            let action = match phase {
                RwPhase::Idle => Some(RwAction::RequestRead(r)),
                RwPhase::Waiting if self.read_admissible(state) => Some(RwAction::EnterRead(r)),
                RwPhase::Inside => Some(RwAction::LeaveRead(r)),
                _ => None,
            };
            if let Some(action) = action {
                actions.push(RwStep {
                    action,
                    task: task_number(r),
                });
            }
        }
        for (w, phase) in state.writers.iter().enumerate() {
            let action = match phase {
                RwPhase::Idle => Some(RwAction::RequestWrite(w)),
                RwPhase::Waiting if self.write_admissible(state) => Some(RwAction::EnterWrite(w)),
                RwPhase::Inside => Some(RwAction::LeaveWrite(w)),
                _ => None,
            };
            if let Some(action) = action {
                actions.push(RwStep {
                    action,
                    task: self.writer_task(w),
                });
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, step: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match step.action {
            RwAction::RequestRead(r) => state.readers[r] = RwPhase::Waiting,
            RwAction::EnterRead(r) => {
                if !self.read_admissible(&state) {
                    return None;
                }
                if state.writers_waiting() > 0 {
                    state.overtaken = true;
                }
                state.readers[r] = RwPhase::Inside;
            }
            RwAction::LeaveRead(r) => state.readers[r] = RwPhase::Done,
            RwAction::RequestWrite(w) => state.writers[w] = RwPhase::Waiting,
            RwAction::EnterWrite(w) => {
                if !self.write_admissible(&state) {
                    return None;
                }
                state.writers[w] = RwPhase::Inside;
            }
            RwAction::LeaveWrite(w) => state.writers[w] = RwPhase::Done,
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("readers xor writer", |_, state: &RwState| {
                state.readers_inside() == 0 || state.writers_inside() == 0
            }),
            Property::always("single writer", |_, state: &RwState| {
                state.writers_inside() <= 1
            }),
            Property::always(
                "no reader overtakes a waiting writer",
                |model: &RwLockModel, state: &RwState| {
                    model.policy != RwModelPolicy::WriterPriority || !state.overtaken
                },
            ),
            Property::sometimes("readers share", |_, state: &RwState| {
                state.readers_inside() >= 2
            }),
            Property::sometimes("writer enters", |_, state: &RwState| {
                state.writers_inside() == 1
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(model: &RwLockModel, state: &RwState, action: RwAction) -> Option<RwState> {
        model.next_state(state, RwStep { action, task: 0 })
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let model = RwLockModel::new(2, 1, RwModelPolicy::WriterPriority);
        let s = model.init_states().remove(0);
        let s = step(&model, &s, RwAction::RequestRead(0)).unwrap();
        let s = step(&model, &s, RwAction::EnterRead(0)).unwrap();
        let s = step(&model, &s, RwAction::RequestWrite(0)).unwrap();
        let s = step(&model, &s, RwAction::RequestRead(1)).unwrap();
        assert!(step(&model, &s, RwAction::EnterRead(1)).is_none());
        assert!(step(&model, &s, RwAction::EnterWrite(0)).is_none());

        let s = step(&model, &s, RwAction::LeaveRead(0)).unwrap();
        let s = step(&model, &s, RwAction::EnterWrite(0)).unwrap();
        assert_eq!(s.writers_inside(), 1);
    }

    #[test]
    fn test_reader_priority_lets_reader_overtake() {
        let model = RwLockModel::new(2, 1, RwModelPolicy::ReaderPriority);
        let s = model.init_states().remove(0);
        let s = step(&model, &s, RwAction::RequestRead(0)).unwrap();
        let s = step(&model, &s, RwAction::EnterRead(0)).unwrap();
        let s = step(&model, &s, RwAction::RequestWrite(0)).unwrap();
        let s = step(&model, &s, RwAction::RequestRead(1)).unwrap();
        let s = step(&model, &s, RwAction::EnterRead(1)).unwrap();
        assert!(s.overtaken);
        assert_eq!(s.readers_inside(), 2);
    }

    #[test]
    fn test_writer_task_numbers_follow_readers() {
        let model = RwLockModel::new(2, 2, RwModelPolicy::WriterPriority);
        assert_eq!(model.writer_task(0), 3);
        assert_eq!(model.writer_task(1), 4);
    }
}
