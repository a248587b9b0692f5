//! Invariant traits for the synchronization primitives.
//!
//! Each module defines the properties that implementations (or the probes
//! wrapped around them) must satisfy.
//!
//! - `counter`: NoLostUpdates, NoPhantomUpdates
//! - `exclusion`: MutualExclusion, BalancedSections (Mutex, SpinLock)
//! - `rwlock`: ReadersXorWriter, SingleWriter, BalancedSections
//! - `signal`: SingleFire, NoLostWakeup, FiredIsPermanent
//! - `once`: ExactlyOnceInit, SingleInstance

pub mod counter;
pub mod exclusion;
pub mod once;
pub mod rwlock;
pub mod signal;

pub use counter::{CounterProperties, CounterPropertyChecker};
pub use exclusion::{ExclusionProperties, ExclusionPropertyChecker};
pub use once::{InitOnceProperties, InitOncePropertyChecker};
pub use rwlock::{readers_xor_writer, RwLockProperties, RwLockPropertyChecker, RwObservation};
pub use signal::{
    SignalEvent, SignalEventKind, SignalHistory, SignalProperties, SignalPropertyChecker,
};
