//! Fixed-size worker pool over a bounded FIFO queue.
//!
//! This module defines [`WorkerPool`], which owns a bounded multi-producer,
//! multi-consumer queue of [`Task`]s and a fixed set of worker threads that
//! drain it. Every worker takes the oldest queued task, runs it to completion,
//! and loops until the queue is both closed and empty.
//!
//! ## Lifecycle
//!
//! 1. [`WorkerPool::new`] / [`WorkerPool::builder`] validate the configuration.
//! 2. [`WorkerPool::start`] spawns the worker threads (once).
//! 3. [`WorkerPool::submit`] enqueues tasks, blocking when the queue is full.
//! 4. [`WorkerPool::close`] stops accepting tasks; queued tasks still run.
//! 5. [`WorkerPool::join`] blocks until every submitted task has completed.
//!
//! ## Backpressure
//!
//! The queue holds at most `capacity` tasks. Once full, `submit` blocks until
//! a worker frees a slot. A capacity of zero makes every submission a
//! rendezvous with an idle worker.

use crate::{
    error::{Error, Result, TrySubmitError},
    observer::{PoolEvent, PoolObserver, TracingObserver},
    pending::PendingCounter,
    pool::worker::worker_loop,
    report::JoinReport,
    task::{Task, TaskReport},
};
use crossbeam_channel::{Receiver, SendError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

/// Prefix for worker thread names; the worker index is appended.
pub const DEFAULT_THREAD_NAME: &str = "workpool-worker";

/// State shared between the pool handle and its workers.
pub(crate) struct Shared {
    pub(crate) pending: PendingCounter,
    pub(crate) reports: Mutex<Vec<TaskReport>>,
    pub(crate) observer: Arc<dyn PoolObserver>,
    pub(crate) shutdown_token: CancellationToken,
}

impl Shared {
    /// Reports an event to the observer.
    ///
    /// A panicking observer is contained here so that it cannot kill a worker
    /// between dequeuing a task and marking it done.
    pub(crate) fn notify(&self, event: &PoolEvent) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.observer.on_event(event))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(?event, "Pool observer panicked");
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Timing {
    started_at: Option<Instant>,
    joined_at: Option<Instant>,
}

impl Timing {
    fn elapsed(self) -> Option<Duration> {
        match (self.started_at, self.joined_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Builder for [`WorkerPool`].
///
/// Defaults to one worker per logical CPU, a queue capacity equal to the
/// worker count and a [`TracingObserver`].
pub struct PoolBuilder {
    workers: usize,
    capacity: Option<usize>,
    observer: Arc<dyn PoolObserver>,
    thread_name: String,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            capacity: None,
            observer: Arc::new(TracingObserver),
            thread_name: String::from(DEFAULT_THREAD_NAME),
        }
    }
}

impl PoolBuilder {
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of tasks the queue holds before `submit` blocks.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Validates the configuration and creates an unstarted pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the worker count is zero.
    pub fn build(self) -> Result<WorkerPool> {
        if self.workers == 0 {
            return Err(Error::InvalidConfiguration {
                reason: String::from("worker count must be at least 1"),
            });
        }

        let capacity = self.capacity.unwrap_or(self.workers);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);

        Ok(WorkerPool {
            worker_count: self.workers,
            capacity,
            thread_name: self.thread_name,
            sender: RwLock::new(Some(sender)),
            receiver,
            shared: Arc::new(Shared {
                pending: PendingCounter::new(),
                reports: Mutex::new(Vec::new()),
                observer: self.observer,
                shutdown_token: CancellationToken::new(),
            }),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            timing: Mutex::new(Timing::default()),
        })
    }
}

/// A bounded pool of worker threads draining a shared FIFO queue.
///
/// The pool lives for one batch of work: it cannot be reopened after
/// [`close`](Self::close) and its worker count never changes. Dropping the pool
/// closes the queue; workers finish whatever is still queued and exit on their
/// own.
pub struct WorkerPool {
    worker_count: usize,
    capacity: usize,
    thread_name: String,
    /// `None` once the pool is closed. Dropping the last sender is what lets
    /// workers observe the end of the queue.
    sender: RwLock<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    shared: Arc<Shared>,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    timing: Mutex<Timing>,
}

impl WorkerPool {
    /// Creates an unstarted pool with `worker_count` workers and a queue that
    /// holds `capacity` tasks before a submitter blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `worker_count` is zero.
    pub fn new(worker_count: usize, capacity: usize) -> Result<Self> {
        Self::builder()
            .workers(worker_count)
            .capacity(capacity)
            .build()
    }

    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Spawns the worker threads.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if called more than once.
    /// - [`Error::Spawn`] if a thread cannot be created. The queue is closed in
    ///   that case so the workers that did start drain it and exit.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let mut handles = self.handles.lock();
        for worker_id in 0..self.worker_count {
            let rx = self.receiver.clone();
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{worker_id}", self.thread_name))
                .spawn(move || worker_loop(worker_id, rx, shared));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to spawn worker {worker_id}: {e}");
                    drop(handles);
                    self.close();
                    return Err(Error::Spawn(e));
                }
            }
        }
        drop(handles);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Started {} workers (queue capacity {})",
            self.worker_count,
            self.capacity
        );

        self.timing.lock().started_at = Some(Instant::now());
        Ok(())
    }

    /// Enqueues a task, blocking while the queue is full.
    ///
    /// The pending count is raised before the task becomes visible to workers,
    /// so a [`join`](Self::join) that starts after this call returns cannot
    /// miss the task. Submitting to a full queue on a pool that was never
    /// started blocks until another thread calls [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] if [`close`](Self::close) was called.
    pub fn submit(&self, task: Task) -> Result<()> {
        // Holding the read guard across the send keeps `close` from completing
        // while a submission is in flight.
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(Error::PoolClosed);
        };

        let id = task.id().clone();
        self.shared.pending.add(1);
        if let Err(SendError(_task)) = sender.send(task) {
            self.shared.pending.done();
            return Err(Error::PoolClosed);
        }

        self.shared.notify(&PoolEvent::TaskSubmitted { id });
        Ok(())
    }

    /// Enqueues a task without blocking.
    ///
    /// # Errors
    ///
    /// Hands the task back as [`TrySubmitError::Full`] when the queue is at
    /// capacity, or [`TrySubmitError::Closed`] after [`close`](Self::close).
    pub fn try_submit(&self, task: Task) -> Result<(), TrySubmitError> {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(TrySubmitError::Closed(task));
        };

        let id = task.id().clone();
        self.shared.pending.add(1);
        match sender.try_send(task) {
            Ok(()) => {
                self.shared.notify(&PoolEvent::TaskSubmitted { id });
                Ok(())
            }
            Err(TrySendError::Full(task)) => {
                self.shared.pending.done();
                Err(TrySubmitError::Full(task))
            }
            Err(TrySendError::Disconnected(task)) => {
                self.shared.pending.done();
                Err(TrySubmitError::Closed(task))
            }
        }
    }

    /// Stops accepting tasks. Queued and running tasks still complete.
    ///
    /// Idempotent. Waits for any `submit` that is blocked on a full queue.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            self.shared.notify(&PoolEvent::PoolClosed);
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// Running work sees [`TaskContext::is_cancelled`](crate::TaskContext::is_cancelled)
    /// turn `true`. Tasks dequeued afterwards are not executed and are reported
    /// as [`TaskOutcome::Cancelled`](crate::TaskOutcome::Cancelled); they still
    /// count as completed, so `join` returns once the queue drains. Does not
    /// close the pool.
    pub fn cancel(&self) {
        if !self.shared.shutdown_token.is_cancelled() {
            self.shared.shutdown_token.cancel();
            self.shared.notify(&PoolEvent::PoolCancelled);
        }
    }

    /// Blocks until every submitted task has completed.
    ///
    /// Returns immediately when nothing is pending, including before any task
    /// was submitted. Call it after the last `submit` has returned (typically
    /// after [`close`](Self::close)); a `submit` racing a `join` may or may not
    /// be waited for.
    pub fn join(&self) -> JoinReport {
        self.shared.pending.wait();
        self.finish_join()
    }

    /// Like [`join`](Self::join), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JoinTimeout`] with the number of tasks still pending.
    pub fn join_timeout(&self, timeout: Duration) -> Result<JoinReport> {
        if !self.shared.pending.wait_timeout(timeout) {
            return Err(Error::JoinTimeout {
                pending: self.shared.pending.count(),
            });
        }
        Ok(self.finish_join())
    }

    fn finish_join(&self) -> JoinReport {
        let elapsed = {
            let mut timing = self.timing.lock();
            timing.joined_at = Some(Instant::now());
            timing.elapsed()
        };
        JoinReport {
            reports: self.shared.reports.lock().clone(),
            elapsed,
        }
    }

    /// Closes the pool, joins, and waits for every worker thread to exit.
    ///
    /// As with [`join`](Self::join), tasks queued on a pool that was never
    /// started keep this call waiting until another thread starts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] if a worker thread died abnormally.
    pub fn shutdown(self) -> Result<JoinReport> {
        self.close();
        let report = self.join();

        let handles = core::mem::take(&mut *self.handles.lock());
        join_workers(handles)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");
        Ok(report)
    }

    /// Time between [`start`](Self::start) returning and the latest
    /// [`join`](Self::join) returning.
    pub fn elapsed(&self) -> Option<Duration> {
        self.timing.lock().elapsed()
    }

    /// Tasks submitted but not yet completed.
    pub fn pending(&self) -> usize {
        self.shared.pending.count()
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.shutdown_token.is_cancelled()
    }
}

/// Joins every worker handle, even after one has failed, and reports the
/// first worker that panicked.
pub(super) fn join_workers(handles: Vec<JoinHandle<()>>) -> Result<()> {
    let mut first_panic = None;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {worker_id} panicked");
            first_panic.get_or_insert(worker_id);
        }
    }

    match first_panic {
        Some(worker_id) => Err(Error::WorkerPanicked { worker_id }),
        None => Ok(()),
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
