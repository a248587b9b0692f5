//! # vs-stateright
//!
//! Stateright models of the synchronization protocols in `vs-primitives`.
//!
//! Each model has a correct variant whose invariants hold in every reachable
//! state and a broken variant the checker must find a counterexample for.
//!
//! ## Usage
//!
//! ```ignore
//! use stateright::{Checker, Model};
//! use vs_stateright::{MutexModel, MutexVariant};
//!
//! MutexModel::new(3, MutexVariant::TestAndSet)
//!     .checker()
//!     .spawn_bfs()
//!     .join()
//!     .assert_properties();
//! ```
//!
//! `trace::counterexample` turns a discovery into a `vs_core::Counterexample`
//! so model checking failures render like DST failures.
//!
//! ## Modules
//!
//! - `mutex`: test-and-set vs. check-then-set acquisition
//! - `rwlock`: writer priority, reader priority, unchecked writer
//! - `signal`: flagged vs. naive condition-variable signalling
//! - `once`: double-checked vs. single-checked lazy initialization

pub mod mutex;
pub mod once;
pub mod rwlock;
pub mod signal;
pub mod trace;

pub use mutex::{MutexAction, MutexModel, MutexState, MutexVariant};
pub use once::{InitAction, InitModel, InitState, InitVariant};
pub use rwlock::{RwAction, RwLockModel, RwModelPolicy, RwState, RwStep};
pub use signal::{SignalAction, SignalModel, SignalState, SignalVariant};
pub use trace::{counterexample, ModelAction};
