use crate::{
    Error, PoolEvent, PoolObserver, RecordingObserver, Task, TaskId, TaskOutcome, TrySubmitError,
    WorkerPool,
};
use crossbeam_channel::bounded;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn started_pool(workers: usize, capacity: usize) -> WorkerPool {
    let pool = WorkerPool::new(workers, capacity).unwrap();
    pool.start().unwrap();
    pool
}

#[test]
fn zero_workers_is_invalid_configuration() {
    let err = WorkerPool::new(0, 10).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration { .. }));
}

#[test]
fn second_start_fails() {
    let pool = WorkerPool::new(2, 4).unwrap();
    assert!(!pool.is_started());
    pool.start().unwrap();
    assert!(matches!(pool.start(), Err(Error::AlreadyStarted)));
    assert!(pool.is_started());
    pool.shutdown().unwrap();
}

#[test]
fn submit_after_close_is_rejected() {
    let ran = Arc::new(AtomicBool::new(false));
    let pool = started_pool(1, 1);
    pool.close();
    pool.close();
    assert!(pool.is_closed());

    let flag = Arc::clone(&ran);
    let err = pool
        .submit(Task::from_fn(1_u64, move || flag.store(true, Ordering::SeqCst)))
        .unwrap_err();
    assert!(matches!(err, Error::PoolClosed));
    assert_eq!(pool.pending(), 0);

    let report = pool.join();
    assert!(report.is_empty());
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn join_without_tasks_returns_immediately() {
    let pool = WorkerPool::new(3, 0).unwrap();
    let report = pool.join();
    assert!(report.is_empty());
    assert_eq!(report.elapsed, None);
    assert!(!pool.is_closed());
}

#[test]
fn every_task_runs_exactly_once() {
    const TASKS: usize = 256;

    for workers in [1, 2, 4, 8] {
        for capacity in [0, 1, 16, TASKS] {
            let counts: Arc<Vec<AtomicUsize>> =
                Arc::new((0..TASKS).map(|_| AtomicUsize::new(0)).collect());
            let pool = started_pool(workers, capacity);

            for i in 0..TASKS {
                let counts = Arc::clone(&counts);
                pool.submit(Task::from_fn(i as u64, move || {
                    counts[i].fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            }
            pool.close();
            let report = pool.join();

            for (i, count) in counts.iter().enumerate() {
                assert_eq!(
                    count.load(Ordering::SeqCst),
                    1,
                    "task {i} ran a wrong number of times ({workers} workers, capacity {capacity})"
                );
            }

            let submitted: HashSet<TaskId> = (0..TASKS as u64).map(TaskId::from).collect();
            let finished: HashSet<TaskId> = report.ids().into_iter().collect();
            assert_eq!(report.len(), TASKS);
            assert_eq!(finished, submitted);
            assert_eq!(report.completed(), TASKS);
            assert_eq!(pool.pending(), 0);
        }
    }
}

#[test]
fn single_worker_completes_in_submission_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let pool = started_pool(1, 4);

    for i in 0..32_u64 {
        let order = Arc::clone(&order);
        pool.submit(Task::from_fn(i, move || order.lock().unwrap().push(i)))
            .unwrap();
    }
    let report = pool.shutdown().unwrap();

    let expected: Vec<u64> = (0..32).collect();
    assert_eq!(*order.lock().unwrap(), expected);
    assert_eq!(
        report.ids(),
        expected.into_iter().map(TaskId::from).collect::<Vec<_>>()
    );
    assert!(report.reports.iter().all(|r| r.worker_id == 0));
}

#[test]
fn full_queue_blocks_submitter_until_a_slot_frees() {
    let (started_tx, started_rx) = bounded::<()>(1);
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let pool = started_pool(1, 1);

    // Occupy the only worker.
    pool.submit(Task::from_fn(1_u64, move || {
        started_tx.send(()).unwrap();
        gate_rx.recv().unwrap();
    }))
    .unwrap();
    started_rx.recv().unwrap();

    // Fill the queue.
    pool.submit(Task::from_fn(2_u64, || {})).unwrap();

    let submitted = AtomicBool::new(false);
    thread::scope(|s| {
        let blocked = s.spawn(|| {
            pool.submit(Task::from_fn(3_u64, || {})).unwrap();
            submitted.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!submitted.load(Ordering::SeqCst), "submit did not block");
        assert_eq!(pool.pending(), 3);

        gate_tx.send(()).unwrap();
        blocked.join().unwrap();
    });
    assert!(submitted.load(Ordering::SeqCst));

    let report = pool.shutdown().unwrap();
    assert_eq!(report.completed(), 3);
}

#[test]
fn zero_capacity_hands_tasks_directly_to_workers() {
    let pool = started_pool(2, 0);
    let counter = Arc::new(AtomicUsize::new(0));

    for i in 0..20_u64 {
        let counter = Arc::clone(&counter);
        pool.submit(Task::from_fn(i, move || {
            thread::sleep(Duration::from_millis(1));
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    let report = pool.shutdown().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 20);
    assert_eq!(report.len(), 20);
}

#[test]
fn workers_run_in_parallel() {
    const UNIT: Duration = Duration::from_millis(25);

    let pool = started_pool(3, 5);
    for id in 1..=5_u32 {
        pool.submit(Task::from_fn(u64::from(id), move || {
            thread::sleep(UNIT * id);
        }))
        .unwrap();
    }
    pool.close();
    let report = pool.join();

    let elapsed = report.elapsed.unwrap();
    let total: Duration = (1..=5).map(|id| UNIT * id).sum();
    assert!(elapsed < total, "{elapsed:?} is not faster than serial {total:?}");
    assert!(elapsed >= UNIT * 5, "{elapsed:?} shorter than the longest task");
    assert_eq!(pool.elapsed(), Some(elapsed));

    let workers: HashSet<usize> = report.reports.iter().map(|r| r.worker_id).collect();
    assert!(workers.len() > 1);
}

#[test]
fn failing_task_does_not_stop_the_batch() {
    let pool = started_pool(2, 8);
    for i in 0..6_u64 {
        pool.submit(Task::new(i, move |_| {
            if i == 3 {
                return Err(format!("task {i} failed").into());
            }
            Ok(())
        }))
        .unwrap();
    }
    let report = pool.shutdown().unwrap();

    assert_eq!(report.len(), 6);
    assert_eq!(report.completed(), 5);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, TaskId::Num(3));
    assert_eq!(
        failures[0].outcome,
        TaskOutcome::Failed {
            message: String::from("task 3 failed")
        }
    );
    assert!(!report.is_success());
}

#[test]
fn panicking_task_is_contained() {
    let pool = started_pool(1, 4);
    let after = Arc::new(AtomicUsize::new(0));

    pool.submit(Task::from_fn("explodes", || panic!("kaboom")))
        .unwrap();
    for i in 0..3_u64 {
        let after = Arc::clone(&after);
        pool.submit(Task::from_fn(i, move || {
            after.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }
    let report = pool.shutdown().unwrap();

    assert_eq!(after.load(Ordering::SeqCst), 3);
    assert_eq!(report.reports[0].id, TaskId::from("explodes"));
    assert_eq!(
        report.reports[0].outcome,
        TaskOutcome::Panicked {
            message: String::from("kaboom")
        }
    );
    assert_eq!(report.completed(), 3);
}

#[test]
fn join_timeout_reports_pending_tasks() {
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let pool = started_pool(1, 1);
    pool.submit(Task::from_fn(1_u64, move || gate_rx.recv().unwrap()))
        .unwrap();
    pool.close();

    let err = pool.join_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, Error::JoinTimeout { pending: 1 }));

    gate_tx.send(()).unwrap();
    let report = pool.join_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(report.completed(), 1);
}

#[test]
fn cancel_skips_queued_tasks_and_signals_running_work() {
    let (started_tx, started_rx) = bounded::<()>(1);
    let pool = started_pool(1, 8);

    pool.submit(Task::new(0_u64, move |ctx| {
        started_tx.send(())?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !ctx.is_cancelled() {
            if Instant::now() > deadline {
                return Err("never cancelled".into());
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }))
    .unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    for i in 1..=4_u64 {
        let ran = Arc::clone(&ran);
        pool.submit(Task::from_fn(i, move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    started_rx.recv().unwrap();
    pool.cancel();
    assert!(pool.is_cancelled());
    let report = pool.shutdown().unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(report.len(), 5);
    assert_eq!(report.reports[0].outcome, TaskOutcome::Completed);
    assert!(
        report.reports[1..]
            .iter()
            .all(|r| r.outcome == TaskOutcome::Cancelled)
    );
}

#[test]
fn try_submit_hands_back_rejected_tasks() {
    let pool = WorkerPool::new(1, 1).unwrap();

    pool.try_submit(Task::from_fn(1_u64, || {})).unwrap();
    let err = pool.try_submit(Task::from_fn(2_u64, || {})).unwrap_err();
    assert!(err.is_full());
    assert_eq!(err.into_task().id(), &TaskId::Num(2));
    assert_eq!(pool.pending(), 1);

    pool.close();
    let err = pool.try_submit(Task::from_fn(3_u64, || {})).unwrap_err();
    assert!(matches!(err, TrySubmitError::Closed(_)));

    // Closing before starting still lets the workers drain the queue.
    pool.start().unwrap();
    let report = pool.shutdown().unwrap();
    assert_eq!(report.ids(), vec![TaskId::Num(1)]);
}

#[test]
fn observer_sees_full_lifecycle() {
    let observer = Arc::new(RecordingObserver::new());
    let pool = WorkerPool::builder()
        .workers(1)
        .capacity(2)
        .observer(observer.clone())
        .thread_name("lifecycle")
        .build()
        .unwrap();
    pool.start().unwrap();

    pool.submit(Task::from_fn(1_u64, || {})).unwrap();
    pool.submit(Task::new(2_u64, |_| Err("bad input".into())))
        .unwrap();
    pool.shutdown().unwrap();

    let events = observer.events();
    let worker_started = events
        .iter()
        .position(|e| *e == PoolEvent::WorkerStarted { worker_id: 0 })
        .unwrap();
    assert_eq!(events.last(), Some(&PoolEvent::WorkerStopped { worker_id: 0 }));
    assert!(events.contains(&PoolEvent::PoolClosed));

    for id in [TaskId::Num(1), TaskId::Num(2)] {
        assert!(events.contains(&PoolEvent::TaskSubmitted { id: id.clone() }));
        let started = events
            .iter()
            .position(|e| *e == PoolEvent::TaskStarted { worker_id: 0, id: id.clone() })
            .unwrap();
        let finished = events
            .iter()
            .position(|e| matches!(e, PoolEvent::TaskFinished { id: fid, .. } if *fid == id))
            .unwrap();
        assert!(worker_started < started && started < finished);
    }
    assert!(events.contains(&PoolEvent::TaskFinished {
        worker_id: 0,
        id: TaskId::Num(2),
        outcome: TaskOutcome::Failed {
            message: String::from("bad input")
        },
    }));
}

struct PanicOnFinish;

impl PoolObserver for PanicOnFinish {
    fn on_event(&self, event: &PoolEvent) {
        if matches!(event, PoolEvent::TaskFinished { .. }) {
            panic!("observer failed on {event:?}");
        }
    }
}

#[test]
fn panicking_observer_does_not_lose_tasks() {
    let pool = WorkerPool::builder()
        .workers(1)
        .capacity(2)
        .observer(Arc::new(PanicOnFinish))
        .build()
        .unwrap();
    pool.start().unwrap();

    pool.submit(Task::from_fn(1_u64, || {})).unwrap();
    pool.submit(Task::from_fn(2_u64, || {})).unwrap();
    pool.close();

    let report = pool.join_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(report.completed(), 2);
    assert_eq!(pool.pending(), 0);

    let report = pool.shutdown().unwrap();
    assert_eq!(report.ids(), vec![TaskId::Num(1), TaskId::Num(2)]);
}

#[test]
fn drop_closes_queue_without_blocking() {
    const TASKS: usize = 4;

    let observer = Arc::new(RecordingObserver::new());
    let ran = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = bounded::<()>(0);

    let pool = WorkerPool::builder()
        .workers(2)
        .capacity(TASKS)
        .observer(observer.clone())
        .build()
        .unwrap();
    pool.start().unwrap();

    for i in 0..TASKS as u64 {
        let ran = Arc::clone(&ran);
        let gate_rx = gate_rx.clone();
        pool.submit(Task::from_fn(i, move || {
            let _ = gate_rx.recv();
            ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    // Workers are parked on the gate, so this only returns if drop does not
    // wait for them.
    drop(pool);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    drop(gate_tx);

    let deadline = Instant::now() + Duration::from_secs(5);
    let stopped = || {
        observer
            .events()
            .iter()
            .filter(|e| matches!(e, PoolEvent::WorkerStopped { .. }))
            .count()
    };
    while stopped() < 2 {
        assert!(Instant::now() < deadline, "workers did not exit after drop");
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(ran.load(Ordering::SeqCst), TASKS);
    assert!(observer.events().contains(&PoolEvent::PoolClosed));
}

#[test]
fn join_workers_waits_for_all_before_reporting_panic() {
    let finished = Arc::new(AtomicBool::new(false));
    let late = Arc::clone(&finished);

    let handles: Vec<thread::JoinHandle<()>> = vec![
        thread::spawn(|| {}),
        thread::spawn(|| panic!("worker died")),
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            late.store(true, Ordering::SeqCst);
        }),
        thread::spawn(|| panic!("worker died too")),
    ];

    let err = super::manager::join_workers(handles).unwrap_err();
    assert!(matches!(err, Error::WorkerPanicked { worker_id: 1 }));
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn worker_threads_are_named() {
    let names = Arc::new(Mutex::new(HashSet::new()));
    let pool = WorkerPool::builder()
        .workers(2)
        .capacity(0)
        .thread_name("named")
        .build()
        .unwrap();
    pool.start().unwrap();

    for i in 0..8_u64 {
        let names = Arc::clone(&names);
        pool.submit(Task::from_fn(i, move || {
            let name = thread::current().name().map(String::from);
            names.lock().unwrap().insert(name);
        }))
        .unwrap();
    }
    pool.shutdown().unwrap();

    let allowed: HashSet<Option<String>> = [Some("named-0".into()), Some("named-1".into())]
        .into_iter()
        .collect();
    assert!(names.lock().unwrap().is_subset(&allowed));
}

#[test]
fn elapsed_is_unknown_until_joined() {
    let pool = WorkerPool::new(1, 0).unwrap();
    assert_eq!(pool.elapsed(), None);
    pool.start().unwrap();
    assert_eq!(pool.elapsed(), None);
    pool.close();
    let report = pool.join();
    assert!(report.elapsed.is_some());
    assert_eq!(pool.elapsed(), report.elapsed);
}

#[test]
fn submitters_on_many_threads() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 64;

    let pool = started_pool(4, 3);
    let seen = Arc::new(Mutex::new(HashSet::with_capacity(THREADS * PER_THREAD)));

    thread::scope(|s| {
        for t in 0..THREADS {
            let pool = &pool;
            let seen = Arc::clone(&seen);
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let id = (t * PER_THREAD + i) as u64;
                    let seen = Arc::clone(&seen);
                    pool.submit(Task::from_fn(id, move || {
                        assert!(seen.lock().unwrap().insert(id));
                    }))
                    .unwrap();
                }
            });
        }
    });

    let report = pool.shutdown().unwrap();
    assert_eq!(report.completed(), THREADS * PER_THREAD);
    assert_eq!(seen.lock().unwrap().len(), THREADS * PER_THREAD);
}
