use crate::{
    observer::PoolEvent,
    pool::manager::Shared,
    task::{Task, TaskContext, TaskOutcome, TaskReport},
};
use crossbeam_channel::Receiver;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

/// Worker thread body.
///
/// Pulls tasks off the shared queue one at a time until the queue is closed
/// and empty. Each task is recorded and then counted as done, so a joiner that
/// wakes on the last `done` sees every report.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker (used for reports and events).
/// - `rx`: Consumer side of the shared FIFO queue.
/// - `shared`: Pending counter, report sink, observer and cancellation token
///   shared with the [`WorkerPool`](crate::WorkerPool).
pub(crate) fn worker_loop(worker_id: usize, rx: Receiver<Task>, shared: Arc<Shared>) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");
    shared.notify(&PoolEvent::WorkerStarted { worker_id });

    // `recv` only fails once every sender is gone and the queue is drained.
    while let Ok(task) = rx.recv() {
        let report = run_task(worker_id, task, &shared);
        shared.reports.lock().push(report);
        shared.pending.done();
    }

    shared.notify(&PoolEvent::WorkerStopped { worker_id });
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

fn run_task(worker_id: usize, task: Task, shared: &Shared) -> TaskReport {
    let id = task.id().clone();
    let started = Instant::now();

    let outcome = if shared.shutdown_token.is_cancelled() {
        TaskOutcome::Cancelled
    } else {
        shared.notify(&PoolEvent::TaskStarted {
            worker_id,
            id: id.clone(),
        });
        let ctx = TaskContext::new(worker_id, shared.shutdown_token.clone());
        match panic::catch_unwind(AssertUnwindSafe(|| task.execute(&ctx))) {
            Ok(Ok(())) => TaskOutcome::Completed,
            Ok(Err(e)) => TaskOutcome::Failed {
                message: e.to_string(),
            },
            Err(payload) => TaskOutcome::Panicked {
                message: panic_message(payload.as_ref()),
            },
        }
    };

    shared.notify(&PoolEvent::TaskFinished {
        worker_id,
        id: id.clone(),
        outcome: outcome.clone(),
    });

    TaskReport {
        id,
        worker_id,
        outcome,
        duration: started.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
