//! # vs-core
//!
//! Core types and invariants for verified synchronization primitives.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for each primitive (e.g., `ExclusionProperties`)
//!
//! Implementations never depend on this crate; instrumentation in `vs-dst`
//! (or a test fixture) implements the property traits and the checkers
//! evaluate them.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, Hazard, StateSnapshot, TaskAction};
pub use property::{PropertyChecker, PropertyResult};
