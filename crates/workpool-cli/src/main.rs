#![doc = include_str!("../README.md")]

mod config;
mod harness;
mod telemetry;

use anyhow::bail;
use clap::Parser;
use config::{CliArgs, HarnessConfig};
use std::io;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let args = CliArgs::parse().complete_from(&mut io::stdin().lock(), &mut io::stdout())?;
    let config = HarnessConfig::try_from(args)?;

    tracing::info!(
        "Running {} tasks on {} workers (queue capacity {}, unit {:?})",
        config.num_tasks,
        config.num_workers,
        config.capacity,
        config.unit
    );

    let report = harness::run(&config)?;

    for task in &report.reports {
        println!(
            "Worker {} finished task {} in {:?}: {}",
            task.worker_id, task.id, task.duration, task.outcome
        );
    }

    let elapsed = report.elapsed.unwrap_or_default();
    println!("All tasks completed. Total time taken: {elapsed:?}");

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} tasks failed", report.len());
    }
    Ok(())
}
