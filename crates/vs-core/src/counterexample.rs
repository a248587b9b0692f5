//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows
//! the sequence of task actions that led to the failure.

use std::fmt;

/// A counterexample showing the failure path.
///
/// Contains the sequence of states and task actions that led
/// to an invariant violation. Can be rendered as a human-readable
/// task diagram.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Task interleaving that caused the failure
    pub interleaving: Vec<TaskAction>,
    /// Synchronization hazards detected
    pub hazards: Vec<Hazard>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure
    pub description: Option<String>,
}

/// Snapshot of primitive state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution
    pub step: u64,
    /// Description of the state
    pub description: String,
    /// Variable values at this point
    pub variables: Vec<(String, String)>,
}

/// Action taken by a task.
#[derive(Debug, Clone)]
pub struct TaskAction {
    /// Task identifier
    pub task_id: u64,
    /// Step number when this action occurred
    pub step: u64,
    /// Description of the action
    pub action: String,
    /// Whether this action succeeded (acquired, observed the signal, ...)
    pub success: bool,
}

/// A synchronization hazard observed during an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hazard {
    /// Increments were issued but the counter does not reflect them
    LostUpdate { expected: u64, observed: u64 },
    /// More than one task was inside an exclusive section
    OverlappingHolders { holders: u64, step: u64 },
    /// Readers and a writer were inside the lock at the same time
    ReaderWriterOverlap { readers: u64, writers: u64, step: u64 },
    /// A waiter that started after the signal fired did not observe it
    LostWakeup { task_id: u64, step: u64 },
    /// A lazily initialized value was constructed more than once
    RepeatedInitialization { runs: u64 },
    /// Tasks blocked on each other with no progress possible
    Deadlock { tasks: Vec<u64> },
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample with DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Set the description for this counterexample.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    /// Add a task action.
    pub fn add_action(&mut self, action: TaskAction) {
        self.interleaving.push(action);
    }

    /// Add a hazard.
    pub fn add_hazard(&mut self, hazard: Hazard) {
        self.hazards.push(hazard);
    }

    /// Render the counterexample as a human-readable task diagram.
    ///
    /// Format:
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Task 1 | Task 2 | State
    /// -----|--------|--------|-------
    ///    1 | lock   |        | owner=1
    ///    2 |        | lock [FAIL] | owner=1
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            output.push_str(&format!("DST_SEED={}\n\n", seed));
        }

        if let Some(ref desc) = self.description {
            output.push_str("Failure: ");
            output.push_str(desc);
            output.push_str("\n\n");
        }

        let mut tasks: Vec<u64> = self.interleaving.iter().map(|a| a.task_id).collect();
        tasks.sort_unstable();
        tasks.dedup();

        if tasks.is_empty() {
            output.push_str("(no task actions recorded)\n");
        } else {
            output.push_str("Step |");
            for tid in &tasks {
                output.push_str(&format!(" Task {} |", tid));
            }
            output.push_str(" State\n");

            output.push_str("-----|");
            for _ in &tasks {
                output.push_str("--------|");
            }
            output.push_str("------\n");

            let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);

            for step in 1..=max_step {
                output.push_str(&format!("{:4} |", step));

                for tid in &tasks {
                    let action = self
                        .interleaving
                        .iter()
                        .find(|a| a.step == step && a.task_id == *tid);

                    match action {
                        Some(a) => {
                            let status = if a.success { "" } else { " [FAIL]" };
                            output.push_str(&format!(" {}{} |", a.action, status));
                        }
                        None => output.push_str("        |"),
                    }
                }

                if let Some(state) = self.states.iter().find(|s| s.step == step) {
                    output.push_str(&format!(" {}", state.description));
                }

                output.push('\n');
            }
        }

        if !self.hazards.is_empty() {
            output.push_str("\nHazards:\n");
            for hazard in &self.hazards {
                output.push_str(&format!("  - {}\n", hazard));
            }
        }

        output
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hazard::LostUpdate { expected, observed } => write!(
                f,
                "Lost update: expected {} but counter reads {}",
                expected, observed
            ),
            Hazard::OverlappingHolders { holders, step } => write!(
                f,
                "Mutual exclusion broken: {} holders at step {}",
                holders, step
            ),
            Hazard::ReaderWriterOverlap {
                readers,
                writers,
                step,
            } => write!(
                f,
                "Reader/writer overlap: {} readers with {} writers at step {}",
                readers, writers, step
            ),
            Hazard::LostWakeup { task_id, step } => write!(
                f,
                "Lost wakeup: task {} waited after fire but never observed it (step {})",
                task_id, step
            ),
            Hazard::RepeatedInitialization { runs } => {
                write!(f, "Repeated initialization: initializer ran {} times", runs)
            }
            Hazard::Deadlock { tasks } => write!(f, "Deadlock between tasks {:?}", tasks),
        }
    }
}
