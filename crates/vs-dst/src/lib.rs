//! # vs-dst
//!
//! Deterministic Simulation Testing for synchronization primitives.
//!
//! Inspired by FoundationDB and TigerBeetle: randomness, fault placement and
//! (for simulated runs) the interleaving all derive from one seed.
//!
//! ## Pieces
//!
//! - `random`: seeded RNG with per-thread streams
//! - `fault`: stalls injected at operation boundaries
//! - `scheduler`: seeded interleaving of simulated threads
//! - `env`: per-thread bundle of the above
//! - `harness`: simulated and real-thread runners
//! - `probe`: instrumentation implementing the `vs-core` property traits
//!
//! ## Usage
//!
//! ```rust
//! use vs_dst::{DstEnv, FaultConfig};
//!
//! let mut env = DstEnv::with_fault_config(12345, FaultConfig::default());
//!
//! let choice = env.rng().gen_range(0..10);
//! assert!(choice < 10);
//!
//! // fault point before an operation: may sleep or yield
//! env.maybe_delay();
//! ```
//!
//! ## Reproducibility
//!
//! To reproduce a failing test:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod env;
pub mod fault;
pub mod harness;
pub mod probe;
pub mod random;
pub mod scheduler;

pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultStats, FaultType};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use probe::{CounterRun, InitRecorder, RwProbe, SectionProbe, SignalRecorder};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
///
/// # Panics
///
/// Panics if `DST_SEED` is set but is not a valid `u64`.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => {
            let seed: u64 = s
                .trim()
                .parse()
                .unwrap_or_else(|_| panic!("DST_SEED must be a valid u64, got {:?}", s));
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            // zero is reserved by the checkers' seed assertions
            let seed = rand::random::<u64>().max(1);
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}
