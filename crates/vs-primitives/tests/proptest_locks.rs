//! Property-based tests: random operation sequences against simple models.
//!
//! `VS_PROPTEST_CASES` overrides the case count of the threaded properties.

#![cfg(not(loom))]

use std::thread;

use proptest::prelude::*;
use vs_core::invariants::RwLockPropertyChecker;
use vs_core::PropertyChecker;
use vs_dst::RwProbe;
use vs_primitives::{AtomicCounter, LockError, RawMutex, RawRwLock, RwLock, RwPolicy};

fn threaded_cases() -> u32 {
    std::env::var("VS_PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(16)
}

#[derive(Debug, Clone, Copy)]
enum RwOp {
    TryRead,
    TryWrite,
    ReleaseRead,
    ReleaseWrite,
}

fn rw_op() -> impl Strategy<Value = RwOp> {
    prop_oneof![
        Just(RwOp::TryRead),
        Just(RwOp::TryWrite),
        Just(RwOp::ReleaseRead),
        Just(RwOp::ReleaseWrite),
    ]
}

fn rw_policy() -> impl Strategy<Value = RwPolicy> {
    prop_oneof![Just(RwPolicy::WriterPriority), Just(RwPolicy::ReaderPriority)]
}

#[derive(Debug, Clone, Copy)]
enum MutexOp {
    TryAcquire,
    Release,
}

fn mutex_op() -> impl Strategy<Value = MutexOp> {
    prop_oneof![Just(MutexOp::TryAcquire), Just(MutexOp::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_rwlock_matches_model(
        policy in rw_policy(),
        ops in prop::collection::vec(rw_op(), 1..200)
    ) {
        let lock = RawRwLock::with_policy(policy);
        let mut readers = 0u32;
        let mut writer = false;

        for op in ops {
            match op {
                RwOp::TryRead => {
                    let admitted = lock.try_acquire_read();
                    prop_assert_eq!(admitted, !writer, "read admission with writer={}", writer);
                    if admitted {
                        readers += 1;
                    }
                }
                RwOp::TryWrite => {
                    let admitted = lock.try_acquire_write();
                    prop_assert_eq!(admitted, !writer && readers == 0);
                    if admitted {
                        writer = true;
                    }
                }
                RwOp::ReleaseRead => {
                    let released = lock.release_read();
                    if readers == 0 {
                        prop_assert_eq!(released, Err(LockError::NotLocked));
                    } else {
                        prop_assert_eq!(released, Ok(()));
                        readers -= 1;
                    }
                }
                RwOp::ReleaseWrite => {
                    let released = lock.release_write();
                    if writer {
                        prop_assert_eq!(released, Ok(()));
                        writer = false;
                    } else {
                        prop_assert_eq!(released, Err(LockError::NotLocked));
                    }
                }
            }

            let snapshot = lock.snapshot();
            prop_assert_eq!(snapshot.readers, readers);
            prop_assert_eq!(snapshot.writer_active, writer);
            prop_assert_eq!(snapshot.writers_waiting, 0);
        }
    }

    #[test]
    fn prop_mutex_matches_model(ops in prop::collection::vec(mutex_op(), 1..200)) {
        let mutex = RawMutex::new();
        let mut locked = false;

        for op in ops {
            match op {
                MutexOp::TryAcquire => {
                    // a holder retrying gets false, not a deadlock
                    prop_assert_eq!(mutex.try_acquire(), !locked);
                    locked = true;
                }
                MutexOp::Release => {
                    let released = mutex.release();
                    if locked {
                        prop_assert_eq!(released, Ok(()));
                    } else {
                        prop_assert_eq!(released, Err(LockError::NotLocked));
                    }
                    locked = false;
                }
            }
            prop_assert_eq!(mutex.is_locked(), locked);
            prop_assert_eq!(mutex.is_held_by_current(), locked);
        }
    }

    #[test]
    fn prop_counter_adds_wrap(initial in any::<u64>(), amounts in prop::collection::vec(any::<u64>(), 0..50)) {
        let counter = AtomicCounter::new(initial);
        let expected = amounts.iter().fold(initial, |acc, a| acc.wrapping_add(*a));
        for a in &amounts {
            counter.add(*a);
        }
        prop_assert_eq!(counter.read(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(threaded_cases()))]

    /// Each thread runs its own script of reads and writes.
    #[test]
    fn prop_rwlock_random_mix_keeps_invariants(
        policy in rw_policy(),
        scripts in prop::collection::vec(prop::collection::vec(any::<bool>(), 1..60), 2..6)
    ) {
        let lock = RwLock::with_policy(0u64, policy);
        let probe = RwProbe::new();
        let writes_expected = scripts.iter().flatten().filter(|w| **w).count() as u64;

        thread::scope(|scope| {
            for script in &scripts {
                let lock = &lock;
                let probe = &probe;
                scope.spawn(move || {
                    for &is_write in script {
                        if is_write {
                            let mut guard = lock.write();
                            probe.write_section(|| *guard += 1);
                        } else {
                            let guard = lock.read();
                            probe.read_section(|| *guard);
                        }
                    }
                });
            }
        });

        let checker = RwLockPropertyChecker::new(&probe);
        prop_assert!(checker.all_hold(), "{}", checker.report());
        prop_assert_eq!(lock.into_inner(), writes_expected);
    }
}
