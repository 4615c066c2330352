//! Serialized task queue.
//!
//! One dedicated worker thread drains a channel of boxed units of work:
//! at most one unit executes at a time, units complete in exact submission
//! order, and a unit that panics fails only its own handle. Once dequeued a
//! unit runs to completion; there is no mid-unit cancellation. All
//! read-modify-write cycles over the profile store are posted here - this is
//! the sole mutual-exclusion mechanism.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use thiserror::Error;
use tracing::warn;

use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskError {
    /// The unit of work panicked. Subsequent units still run.
    #[error("queued task panicked")]
    Panicked,
    /// The queue worker is gone; the unit did not run.
    #[error("task queue is shut down")]
    Shutdown,
}

impl TaskError {
    pub fn transience(&self) -> Transience {
        match self {
            TaskError::Panicked => Transience::Unknown,
            TaskError::Shutdown => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            TaskError::Panicked => Effect::Unknown,
            TaskError::Shutdown => Effect::None,
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

/// Handle to one posted unit of work.
///
/// Dropping the handle does not cancel the unit; it still runs in order.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the unit settles.
    pub fn join(self) -> Result<T, TaskError> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_panic)) => Err(TaskError::Panicked),
            // Sender dropped without a result: the job never ran.
            Err(_) => Err(TaskError::Shutdown),
        }
    }

    /// Non-blocking probe; `None` while the unit is still pending.
    pub fn try_join(&self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(_panic)) => Some(Err(TaskError::Panicked)),
            Err(crossbeam::channel::TryRecvError::Empty) => None,
            Err(crossbeam::channel::TryRecvError::Disconnected) => Some(Err(TaskError::Shutdown)),
        }
    }
}

pub struct SerialQueue {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<Job>();
        let worker = thread::Builder::new()
            .name("persona-queue".into())
            .spawn(move || run_queue_loop(rx))
            .expect("spawn queue worker");
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Enqueue a unit of work. Units run strictly one at a time, in the
    /// order they were posted, each to completion before the next starts.
    pub fn post<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = bounded::<thread::Result<T>>(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            // The caller may have dropped its handle; that is fine.
            let _ = result_tx.send(outcome);
        });
        if let Some(tx) = &self.tx
            && tx.send(job).is_ok()
        {
            return TaskHandle { rx: result_rx };
        }
        // Worker gone: the job (and its result sender) is dropped, so the
        // handle settles as Shutdown.
        TaskHandle { rx: result_rx }
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Disconnect the channel; the worker drains already-posted units,
        // then exits.
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("queue worker exited abnormally");
        }
    }
}

fn run_queue_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        job();
    }
}
