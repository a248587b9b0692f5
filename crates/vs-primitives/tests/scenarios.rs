//! End-to-end scenarios: tasks spawned by the test act as the callers.

#![cfg(not(loom))]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vs_primitives::{
    for_each_parallel, spawn_task, AtomicCounter, InitOnce, Mutex, OneShotSignal, PackagedTask,
    TaskError,
};

#[test]
fn test_ten_tasks_million_increments() {
    let counter = Arc::new(AtomicCounter::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..100_000 {
                    counter.increment();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.read(), 1_000_000);
}

#[test]
fn test_reader_never_sees_unpopulated_state() {
    let shared = Arc::new(Mutex::new(String::from("Empty")));
    let populated = Arc::new(OneShotSignal::new());

    let reader = {
        let shared = Arc::clone(&shared);
        let populated = Arc::clone(&populated);
        thread::spawn(move || {
            populated.wait();
            shared.lock().clone()
        })
    };

    let writer = {
        let shared = Arc::clone(&shared);
        let populated = Arc::clone(&populated);
        thread::spawn(move || {
            let mut guard = shared.lock();
            thread::sleep(Duration::from_secs(2));
            *guard = String::from("Populated");
            drop(guard);
            populated.fire(()).unwrap();
        })
    };

    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), "Populated");
}

#[test]
fn test_reader_arriving_late_still_sees_populated() {
    let shared = Arc::new(Mutex::new(String::from("Empty")));
    let populated = Arc::new(OneShotSignal::new());

    {
        let mut guard = shared.lock();
        *guard = String::from("Populated");
    }
    populated.fire(()).unwrap();

    let reader = {
        let shared = Arc::clone(&shared);
        let populated = Arc::clone(&populated);
        thread::spawn(move || {
            populated.wait();
            shared.lock().clone()
        })
    };
    assert_eq!(reader.join().unwrap(), "Populated");
}

#[test]
fn test_timed_try_lock_fails_then_succeeds() {
    let lock = Arc::new(Mutex::new(()));
    let held = Arc::new(OneShotSignal::new());

    let holder = {
        let lock = Arc::clone(&lock);
        let held = Arc::clone(&held);
        thread::spawn(move || {
            let _guard = lock.lock();
            held.fire(()).unwrap();
            thread::sleep(Duration::from_millis(500));
        })
    };

    held.wait();
    let mut failures = 0;
    loop {
        match lock.try_lock_for(Duration::from_millis(90)) {
            Some(_guard) => break,
            None => failures += 1,
        }
        assert!(failures < 100, "lock never became available");
    }

    holder.join().unwrap();
    assert!(failures >= 1, "first attempts must time out");
}

#[test]
fn test_moving_deadline_polling() {
    let lock = Arc::new(Mutex::new(0u32));
    let held = Arc::new(OneShotSignal::new());

    let holder = {
        let lock = Arc::clone(&lock);
        let held = Arc::clone(&held);
        thread::spawn(move || {
            let _guard = lock.lock();
            held.fire(()).unwrap();
            thread::sleep(Duration::from_millis(300));
        })
    };

    held.wait();
    let mut polls = 0;
    let guard = loop {
        polls += 1;
        let deadline = Instant::now() + Duration::from_millis(100);
        if let Some(guard) = lock.try_lock_until(deadline) {
            break guard;
        }
    };

    assert!(polls >= 2);
    drop(guard);
    holder.join().unwrap();
}

#[test]
fn test_waiter_after_fire_returns_promptly() {
    let signal = Arc::new(OneShotSignal::new());
    signal.fire(5u8).unwrap();

    let waiter = {
        let signal = Arc::clone(&signal);
        thread::spawn(move || {
            let start = Instant::now();
            let value = *signal.wait();
            (value, start.elapsed())
        })
    };

    let (value, elapsed) = waiter.join().unwrap();
    assert_eq!(value, 5);
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn test_init_once_ten_first_callers() {
    let cell: Arc<InitOnce<Vec<u8>>> = Arc::new(InitOnce::new());
    let runs = Arc::new(AtomicCounter::default());
    let start = Arc::new(std::sync::Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let runs = Arc::clone(&runs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let value = cell.get_or_init(|| {
                    runs.increment();
                    vec![1, 2, 3]
                });
                value.as_ptr() as usize
            })
        })
        .collect();

    let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(runs.read(), 1);
    assert!(addresses.iter().all(|a| *a == addresses[0]));
}

#[test]
fn test_work_passed_by_copy() {
    let seed = 21u64;
    let future = spawn_task(move || seed * 2);
    assert_eq!(future.get(), Ok(42));
    // the caller's copy is untouched
    assert_eq!(seed, 21);
}

#[test]
fn test_work_passed_by_shared_reference() {
    let counter = AtomicCounter::default();
    let lock = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for i in 0..4u32 {
            let counter = &counter;
            let lock = &lock;
            scope.spawn(move || {
                counter.increment();
                lock.lock().push(i);
            });
        }
    });

    assert_eq!(counter.read(), 4);
    let mut seen = lock.into_inner();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn test_work_passed_by_move() {
    let data = vec![3, 1, 2];
    let (task, future) = PackagedTask::new(move || {
        let mut data = data;
        data.sort_unstable();
        data
    });

    let worker = thread::spawn(move || task.run());
    assert_eq!(future.get(), Ok(vec![1, 2, 3]));
    worker.join().unwrap();
}

#[test]
fn test_parallel_for_each_with_shared_counter() {
    let hits = AtomicCounter::default();
    let mut items = vec![0u32; 10_000];

    for_each_parallel(&mut items, 8, |item| {
        *item += 1;
        hits.increment();
    });

    assert_eq!(hits.read(), 10_000);
    assert!(items.iter().all(|v| *v == 1));
}

#[test]
fn test_task_outcomes() {
    let (task, abandoned) = PackagedTask::<String>::new(|| String::from("never"));
    drop(task);
    assert_eq!(abandoned.get(), Err(TaskError::Abandoned));

    let panicked = spawn_task(|| -> u8 { panic!("worker failed") });
    match panicked.get() {
        Err(TaskError::Panicked(message)) => assert!(message.contains("worker failed")),
        other => panic!("unexpected outcome {:?}", other),
    }
}
