//! Liveness hazards and their remedies, as runnable scenarios.
//!
//! - Lock-order inversion: two tasks take the same two locks in opposite
//!   orders. Run with timed acquisition so the deadlock is observable
//!   instead of hanging the process.
//! - Polite retry: two tasks that back off in lockstep whenever they cannot
//!   get the second lock keep changing state without making progress
//!   (livelock).
//!
//! `acquire_both` is the remedy for the first: every task takes the locks
//! in one global (address) order.

use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use crate::mutex::{Mutex, MutexGuard};

/// Lock two mutexes in address order, regardless of argument order.
///
/// Any set of tasks that only takes pairs of locks through this function
/// cannot deadlock on them.
///
/// # Panics
///
/// Panics if both arguments are the same mutex (a recursive acquire).
pub fn acquire_both<'a, A, B>(
    first: &'a Mutex<A>,
    second: &'a Mutex<B>,
) -> (MutexGuard<'a, A>, MutexGuard<'a, B>) {
    let first_addr = first as *const Mutex<A> as usize;
    let second_addr = second as *const Mutex<B> as usize;

    if first_addr <= second_addr {
        let a = first.lock();
        let b = second.lock();
        (a, b)
    } else {
        let b = second.lock();
        let a = first.lock();
        (a, b)
    }
}

/// Result of running two competing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairOutcome {
    pub first_completed: bool,
    pub second_completed: bool,
}

impl PairOutcome {
    /// Neither task got both locks.
    #[must_use]
    pub fn deadlocked(&self) -> bool {
        !self.first_completed && !self.second_completed
    }
}

/// Two tasks each hold one lock and then ask for the other's.
///
/// Both hold their first lock for `hold` before asking, then wait at most
/// `patience` for the second. Neither releases its first lock until both
/// have given up, so the result is a deadlock on every run.
pub fn run_lock_order_inversion(hold: Duration, patience: Duration) -> PairOutcome {
    let left = Mutex::new(());
    let right = Mutex::new(());
    let holding = Barrier::new(2);
    let attempted = Barrier::new(2);

    let contend = |mine: &Mutex<()>, theirs: &Mutex<()>| {
        let _mine = mine.lock();
        holding.wait();
        thread::sleep(hold);
        let completed = theirs.try_lock_for(patience).is_some();
        attempted.wait();
        completed
    };

    thread::scope(|scope| {
        let first = scope.spawn(|| contend(&left, &right));
        let second = scope.spawn(|| contend(&right, &left));
        let outcome = PairOutcome {
            first_completed: first.join().unwrap_or(false),
            second_completed: second.join().unwrap_or(false),
        };
        log::debug!("lock order inversion: {:?}", outcome);
        outcome
    })
}

/// Same two tasks and locks, but both go through `acquire_both`.
pub fn run_consistent_order(hold: Duration) -> PairOutcome {
    let left = Mutex::new(0u32);
    let right = Mutex::new(0u32);

    let work = |a: &Mutex<u32>, b: &Mutex<u32>| {
        let (mut x, mut y) = acquire_both(a, b);
        thread::sleep(hold);
        *x += 1;
        *y += 1;
        true
    };

    thread::scope(|scope| {
        let first = scope.spawn(|| work(&left, &right));
        let second = scope.spawn(|| work(&right, &left));
        PairOutcome {
            first_completed: first.join().unwrap_or(false),
            second_completed: second.join().unwrap_or(false),
        }
    })
}

/// How the polite tasks back off after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Both release and retry at the same moment: livelock.
    Lockstep,
    /// The second task waits longer before retrying, breaking the symmetry.
    Asymmetric,
}

/// Result of the polite-retry scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivelockOutcome {
    pub first_rounds: u32,
    pub second_rounds: u32,
    pub first_completed: bool,
    pub second_completed: bool,
}

impl LivelockOutcome {
    /// Both tasks kept retrying until they ran out of rounds.
    #[must_use]
    pub fn livelocked(&self) -> bool {
        !self.first_completed && !self.second_completed
    }
}

/// Two tasks each take their own lock, try the other's for `patience`, and
/// release their own and retry if that fails, for at most `rounds_max`
/// rounds.
pub fn run_polite_retry(
    backoff: Backoff,
    rounds_max: u32,
    hold: Duration,
    patience: Duration,
) -> LivelockOutcome {
    debug_assert!(rounds_max > 0, "at least one round");
    let left = Mutex::new(());
    let right = Mutex::new(());

    let outcome = match backoff {
        Backoff::Lockstep => {
            let holding = Barrier::new(2);
            let attempted = Barrier::new(2);
            let polite = |mine: &Mutex<()>, theirs: &Mutex<()>| {
                for round in 1..=rounds_max {
                    let own = mine.lock();
                    holding.wait();
                    thread::sleep(hold);
                    let completed = theirs.try_lock_for(patience).is_some();
                    attempted.wait();
                    drop(own);
                    if completed {
                        return (round, true);
                    }
                }
                (rounds_max, false)
            };
            run_pair(|| polite(&left, &right), || polite(&right, &left))
        }
        Backoff::Asymmetric => {
            let polite = |mine: &Mutex<()>, theirs: &Mutex<()>, pause: Duration| {
                for round in 1..=rounds_max {
                    let own = mine.lock();
                    thread::sleep(hold);
                    let completed = theirs.try_lock_for(patience).is_some();
                    drop(own);
                    if completed {
                        return (round, true);
                    }
                    thread::sleep(pause);
                }
                (rounds_max, false)
            };
            run_pair(
                || polite(&left, &right, Duration::ZERO),
                || polite(&right, &left, hold * 3 + patience),
            )
        }
    };

    log::debug!("polite retry ({:?}): {:?}", backoff, outcome);
    outcome
}

fn run_pair<F, G>(first: F, second: G) -> LivelockOutcome
where
    F: FnOnce() -> (u32, bool) + Send,
    G: FnOnce() -> (u32, bool) + Send,
{
    thread::scope(|scope| {
        let first = scope.spawn(first);
        let second = scope.spawn(second);
        let (first_rounds, first_completed) = first.join().unwrap_or((0, false));
        let (second_rounds, second_completed) = second.join().unwrap_or((0, false));
        LivelockOutcome {
            first_rounds,
            second_rounds,
            first_completed,
            second_completed,
        }
    })
}
