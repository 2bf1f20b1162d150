//! Error types for the worker pool.
//!
//! Configuration and protocol errors are returned synchronously to the call
//! that caused them and never leave the pool in a corrupted state. Failures
//! inside a task's work are not errors of the pool; they are recorded per task
//! as a [`TaskOutcome`](crate::TaskOutcome) and surfaced through
//! [`JoinReport`](crate::JoinReport).

use crate::task::Task;
use thiserror::Error;

/// A result type defaulting to the pool's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the pool itself can produce.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The pool was built with an unusable configuration (e.g. zero workers).
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// [`WorkerPool::start`](crate::WorkerPool::start) was called twice.
    #[error("Worker pool already started")]
    AlreadyStarted,

    /// A task was submitted after the pool was closed.
    #[error("Worker pool is closed")]
    PoolClosed,

    /// A deadline-bounded join expired before every task completed.
    #[error("Join timed out with {pending} task(s) still pending")]
    JoinTimeout { pending: usize },

    /// The operating system refused to spawn a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread terminated abnormally.
    ///
    /// Task panics are caught per task, so this only happens when the pool's
    /// own bookkeeping (or an observer) panicked on a worker thread.
    #[error("Worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
}

/// Rejection returned by [`WorkerPool::try_submit`](crate::WorkerPool::try_submit).
///
/// The rejected task is handed back so the caller can retry or drop it.
#[derive(Error, Debug)]
pub enum TrySubmitError {
    /// The queue is at capacity.
    #[error("Worker queue is full")]
    Full(Task),

    /// The pool no longer accepts tasks.
    #[error("Worker pool is closed")]
    Closed(Task),
}

impl TrySubmitError {
    /// Returns the task that was not accepted.
    pub fn into_task(self) -> Task {
        match self {
            Self::Full(task) | Self::Closed(task) => task,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}
