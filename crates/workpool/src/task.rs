//! Units of work executed by a [`WorkerPool`](crate::WorkerPool).
//!
//! A [`Task`] pairs an opaque [`TaskId`] with a one-shot closure. The pool
//! drives every task through `Queued -> Dispatched -> Running -> Completed`
//! exactly once; nothing about that lifecycle is observable on the task
//! itself. How the work ended is recorded as a [`TaskOutcome`].

use core::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error type that fallible work may return.
///
/// Boxed so that work can use `?` on any error type.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Work = Box<dyn FnOnce(&TaskContext) -> Result<(), TaskError> + Send + 'static>;

/// Identifier of a task, unique within one batch.
///
/// Only used for observability; it carries no ordering guarantee.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Num(u64),
    Name(Arc<str>),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::Name(Arc::from(value))
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self::Name(Arc::from(value))
    }
}

/// An immutable unit of work: an identifier plus a one-shot operation.
pub struct Task {
    id: TaskId,
    work: Work,
}

impl Task {
    /// Creates a task whose work may fail.
    ///
    /// The work receives a [`TaskContext`] through which it can observe
    /// cooperative cancellation of the pool.
    pub fn new<I, F>(id: I, work: F) -> Self
    where
        I: Into<TaskId>,
        F: FnOnce(&TaskContext) -> Result<(), TaskError> + Send + 'static,
    {
        Self {
            id: id.into(),
            work: Box::new(work),
        }
    }

    /// Creates a task from a zero-argument closure with no error channel.
    pub fn from_fn<I, F>(id: I, f: F) -> Self
    where
        I: Into<TaskId>,
        F: FnOnce() + Send + 'static,
    {
        Self::new(id, move |_| {
            f();
            Ok(())
        })
    }

    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Runs the work synchronously on the calling thread.
    pub fn execute(self, ctx: &TaskContext) -> Result<(), TaskError> {
        (self.work)(ctx)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Execution context handed to a task's work.
#[derive(Clone, Debug)]
pub struct TaskContext {
    worker_id: usize,
    token: CancellationToken,
}

impl TaskContext {
    pub const fn new(worker_id: usize, token: CancellationToken) -> Self {
        Self { worker_id, token }
    }

    /// Index of the worker running this task.
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Returns `true` once [`WorkerPool::cancel`](crate::WorkerPool::cancel)
    /// has been called. Long-running work should poll this and return early.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }
}

/// How a task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work returned `Ok(())`.
    Completed,
    /// The work returned an error.
    Failed { message: String },
    /// The work panicked. The panic was contained to this task.
    Panicked { message: String },
    /// The task was dequeued after the pool was cancelled and never ran.
    Cancelled,
}

impl TaskOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// `true` for [`Failed`](Self::Failed) and [`Panicked`](Self::Panicked).
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Panicked { .. })
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed { message } => write!(f, "failed: {message}"),
            Self::Panicked { message } => write!(f, "panicked: {message}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-task record collected by the pool and returned from join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub worker_id: usize,
    pub outcome: TaskOutcome,
    /// Wall-clock time the worker spent on the task.
    pub duration: Duration,
}
