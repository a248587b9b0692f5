//! Converting checker discoveries into `vs-core` counterexamples.
//!
//! A discovery is a path of actions from an initial state. Each action is
//! attributed to the task that performed it, so the path renders as the same
//! task diagram the DST checkers produce.

use std::fmt::Debug;

use stateright::{Checker, Model};
use vs_core::{Counterexample, StateSnapshot, TaskAction};

/// An action performed by one task of a model.
pub trait ModelAction {
    /// Task that performs the action, numbered from 1.
    fn task(&self) -> u64;

    /// Short label for the diagram cell.
    fn label(&self) -> String;
}

/// Task numbers in diagrams start at 1; model indices start at 0.
pub(crate) fn task_number(index: usize) -> u64 {
    index as u64 + 1
}

/// Build a counterexample from the checker's discovery for `property`.
///
/// Returns `None` when the property has no discovery: an `always` property
/// that held, or a `sometimes` property that was never satisfied.
pub fn counterexample<M, C>(checker: &C, property: &'static str) -> Option<Counterexample>
where
    M: Model,
    M::State: Debug,
    M::Action: ModelAction,
    C: Checker<M>,
{
    let path = checker.discovery(property)?;
    let last_state = format!("{:?}", path.last_state());
    let actions = path.into_actions();

    let mut ce = Counterexample::new().with_description(format!(
        "{} discovered after {} actions",
        property,
        actions.len()
    ));
    for (index, action) in actions.iter().enumerate() {
        ce.add_action(TaskAction {
            task_id: action.task(),
            step: index as u64 + 1,
            action: action.label(),
            success: true,
        });
    }
    ce.add_state(StateSnapshot {
        step: actions.len() as u64,
        description: property.to_string(),
        variables: vec![("state".to_string(), last_state)],
    });

    Some(ce)
}
