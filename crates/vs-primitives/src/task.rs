//! Deferred work whose result is delivered through a one-shot signal.
//!
//! `PackagedTask::new` splits a closure into the runnable half and a
//! `TaskFuture` that blocks until the value (or the reason there is none)
//! arrives. The result travels through a `OneShotSignal` that rejects
//! repeated fires, so exactly one outcome is ever delivered:
//!
//! - the closure's return value,
//! - `TaskError::Panicked` if it panicked,
//! - `TaskError::Abandoned` if the task was dropped without running.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::TaskError;
use crate::mutex::Mutex;
use crate::signal::{FirePolicy, OneShotSignal};

type Outcome<T> = Result<T, TaskError>;

/// The signal payload. The future takes the value out exactly once.
type OutcomeSlot<T> = Mutex<Option<Outcome<T>>>;

type Work<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// Runnable half of a packaged task.
pub struct PackagedTask<T> {
    work: Option<Work<T>>,
    outcome: Arc<OneShotSignal<OutcomeSlot<T>>>,
}

/// Receiving half of a packaged task.
pub struct TaskFuture<T> {
    outcome: Arc<OneShotSignal<OutcomeSlot<T>>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> PackagedTask<T> {
    /// Package `work` and return it with the future for its result.
    pub fn new<F>(work: F) -> (Self, TaskFuture<T>)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let outcome = Arc::new(OneShotSignal::with_policy(FirePolicy::Reject));
        let task = Self {
            work: Some(Box::new(work)),
            outcome: Arc::clone(&outcome),
        };
        let future = TaskFuture {
            outcome,
            worker: None,
        };
        (task, future)
    }

    /// Run the work on the calling thread and deliver its outcome.
    pub fn run(mut self) {
        if let Some(work) = self.work.take() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| TaskError::Panicked(panic_message(&*payload)));
            self.deliver(outcome);
        }
    }

    fn deliver(&self, outcome: Outcome<T>) {
        if let Err(e) = self.outcome.fire(Mutex::new(Some(outcome))) {
            log::warn!("packaged task outcome delivered twice: {}", e);
        }
    }
}

impl<T> Drop for PackagedTask<T> {
    fn drop(&mut self) {
        if self.work.take().is_some() {
            log::debug!("packaged task dropped without running");
            if let Err(e) = self
                .outcome
                .fire(Mutex::new(Some(Err(TaskError::Abandoned))))
            {
                log::warn!("packaged task outcome delivered twice: {}", e);
            }
        }
    }
}

impl<T> fmt::Debug for PackagedTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagedTask")
            .field("ran", &self.work.is_none())
            .finish()
    }
}

impl<T> TaskFuture<T> {
    /// Whether the outcome has been delivered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.outcome.is_fired()
    }

    /// Wait at most `timeout` for the outcome. Returns whether it arrived.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.outcome.wait_timeout(timeout).is_some()
    }

    /// Block until the outcome arrives and return it.
    pub fn get(mut self) -> Result<T, TaskError> {
        let outcome = self
            .outcome
            .wait()
            .lock()
            .take()
            .unwrap_or(Err(TaskError::Abandoned));

        if let Some(worker) = self.worker.take() {
            // the outcome is in, so the worker has nothing left to do
            if worker.join().is_err() {
                log::warn!("task worker thread panicked after delivering");
            }
        }
        outcome
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Run `work` on a new thread and return the future for its result.
pub fn spawn_task<F, T>(work: F) -> TaskFuture<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (task, mut future) = PackagedTask::new(work);
    future.worker = Some(thread::spawn(move || task.run()));
    future
}

/// Apply `f` to every item, splitting the slice across `workers` threads.
///
/// Returns once every item has been processed. With zero workers the items
/// are processed on one thread.
pub fn for_each_parallel<T, F>(items: &mut [T], workers: usize, f: F)
where
    T: Send,
    F: Fn(&mut T) + Sync,
{
    if items.is_empty() {
        return;
    }
    let workers = workers.clamp(1, items.len());
    let chunk_size = items.len().div_ceil(workers);
    let f = &f;

    thread::scope(|scope| {
        for chunk in items.chunks_mut(chunk_size) {
            scope.spawn(move || chunk.iter_mut().for_each(f));
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
