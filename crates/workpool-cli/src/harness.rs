//! Synthetic batch used to demonstrate the pool.
//!
//! Task `i` simulates `i * unit` of blocking work, so later tasks take longer
//! and the effect of adding workers shows up directly in the elapsed time.

use crate::config::HarnessConfig;
use std::{thread, time::Duration};
use workpool::{JoinReport, Result, Task, WorkerPool};

/// Longest single sleep; cancellation is checked between slices.
const SLICE: Duration = Duration::from_millis(50);

/// Builds task `id`, sleeping for `id * unit`.
pub fn simulated_task(id: u32, unit: Duration) -> Task {
    Task::new(u64::from(id), move |ctx| {
        let duration = unit.saturating_mul(id);
        tracing::info!(
            task_id = id,
            worker_id = ctx.worker_id(),
            "Started executing task, will take {duration:?}"
        );

        let mut remaining = duration;
        while !remaining.is_zero() {
            if ctx.is_cancelled() {
                return Err(format!("task {id} cancelled with {remaining:?} left").into());
            }
            let step = remaining.min(SLICE);
            thread::sleep(step);
            remaining -= step;
        }
        Ok(())
    })
}

/// Runs the whole batch and waits for every worker to exit.
pub fn run(config: &HarnessConfig) -> Result<JoinReport> {
    let pool = WorkerPool::builder()
        .workers(config.num_workers)
        .capacity(config.capacity)
        .build()?;
    pool.start()?;

    // `HarnessConfig` guarantees the task count fits in a u32.
    for id in 1..=config.num_tasks as u32 {
        pool.submit(simulated_task(id, config.unit))?;
    }

    pool.shutdown()
}
