//! Lifecycle observation for the worker pool.
//!
//! The pool never logs directly. Every lifecycle transition is reported to an
//! injected [`PoolObserver`], so callers decide where events go: the default
//! [`TracingObserver`] forwards them to `tracing` (when the `tracing` feature
//! is enabled), while [`RecordingObserver`] keeps them in memory for
//! assertions.

use crate::task::{TaskId, TaskOutcome};
use parking_lot::Mutex;

/// A lifecycle event emitted by the pool or one of its workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    WorkerStarted {
        worker_id: usize,
    },
    /// A task was accepted into the queue.
    TaskSubmitted {
        id: TaskId,
    },
    TaskStarted {
        worker_id: usize,
        id: TaskId,
    },
    TaskFinished {
        worker_id: usize,
        id: TaskId,
        outcome: TaskOutcome,
    },
    /// The queue drained and the worker exited.
    WorkerStopped {
        worker_id: usize,
    },
    PoolClosed,
    PoolCancelled,
}

/// Receives pool lifecycle events.
///
/// Called synchronously from submitting threads and worker threads, so
/// implementations should be cheap and must not block on the pool.
pub trait PoolObserver: Send + Sync {
    fn on_event(&self, event: &PoolEvent);
}

/// Forwards events to `tracing`. A no-op without the `tracing` feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn on_event(&self, _event: &PoolEvent) {
        #[cfg(feature = "tracing")]
        log_event(_event);
    }
}

#[cfg(feature = "tracing")]
fn log_event(event: &PoolEvent) {
    match event {
        PoolEvent::WorkerStarted { worker_id } => {
            tracing::debug!(worker_id, "Worker started");
        }
        PoolEvent::TaskSubmitted { id } => {
            tracing::trace!(task_id = %id, "Task submitted");
        }
        PoolEvent::TaskStarted { worker_id, id } => {
            tracing::debug!(worker_id, task_id = %id, "Worker started task");
        }
        PoolEvent::TaskFinished {
            worker_id,
            id,
            outcome,
        } => {
            if outcome.is_failure() {
                tracing::warn!(worker_id, task_id = %id, %outcome, "Worker finished task");
            } else {
                tracing::debug!(worker_id, task_id = %id, %outcome, "Worker finished task");
            }
        }
        PoolEvent::WorkerStopped { worker_id } => {
            tracing::debug!(worker_id, "Worker stopped");
        }
        PoolEvent::PoolClosed => tracing::debug!("Worker pool closed"),
        PoolEvent::PoolCancelled => tracing::info!("Worker pool cancelled"),
    }
}

/// Keeps every event in memory, in the order observed.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PoolEvent>>,
}

impl RecordingObserver {
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().clone()
    }

    /// Drains the recorded events.
    pub fn take(&self) -> Vec<PoolEvent> {
        core::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl PoolObserver for RecordingObserver {
    fn on_event(&self, event: &PoolEvent) {
        self.events.lock().push(event.clone());
    }
}
