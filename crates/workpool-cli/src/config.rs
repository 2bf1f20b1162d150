use anyhow::{Context, bail};
use clap::Parser;
use std::io::{BufRead, Write};
use std::time::Duration;

/// Largest queue the harness will allocate. The queue reserves every slot up
/// front, so the task-count default is clamped to this.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Runtime configuration for the `workpool` harness.
///
/// Every value can come from a flag or an environment variable (a `.env` file
/// is honored). The task and worker counts are prompted for on stdin when
/// neither is given.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "workpool",
    version,
    about = "Runs a batch of simulated tasks on a bounded worker pool"
)]
pub struct CliArgs {
    /// Number of tasks to run. Task `i` sleeps for `i * unit-ms`.
    ///
    /// Environment variable: `NUM_TASKS`
    #[arg(long, env = "NUM_TASKS")]
    pub tasks: Option<usize>,

    /// Number of worker threads draining the queue.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub workers: Option<usize>,

    /// Tasks the queue buffers before submission blocks. Defaults to the task
    /// count (at most 1048576), so small batches never wait on submission.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY")]
    pub capacity: Option<usize>,

    /// Simulated work per unit of task id, in milliseconds.
    ///
    /// Environment variable: `TASK_UNIT_MS`
    #[arg(long = "unit-ms", env = "TASK_UNIT_MS", default_value_t = 2000)]
    pub unit_ms: u64,
}

impl CliArgs {
    /// Fills in missing counts by prompting on `input`/`output`.
    pub fn complete_from<R: BufRead, W: Write>(
        mut self,
        input: &mut R,
        output: &mut W,
    ) -> anyhow::Result<Self> {
        if self.tasks.is_none() {
            self.tasks = Some(prompt_count(input, output, "Enter the number of tasks: ")?);
        }
        if self.workers.is_none() {
            self.workers = Some(prompt_count(
                input,
                output,
                "Enter the number of workers in the worker pool: ",
            )?);
        }
        Ok(self)
    }
}

fn prompt_count<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> anyhow::Result<usize> {
    output.write_all(prompt.as_bytes())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).context("Error reading input")? == 0 {
        bail!("Error reading input: unexpected end of input");
    }
    let line = line.trim();
    line.parse()
        .with_context(|| format!("Error reading input: {line:?} is not a count"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub num_tasks: usize,
    pub num_workers: usize,
    pub capacity: usize,
    pub unit: Duration,
}

impl TryFrom<CliArgs> for HarnessConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(num_tasks) = args.tasks else {
            bail!("NUM_TASKS was not provided");
        };
        let Some(num_workers) = args.workers else {
            bail!("NUM_WORKERS was not provided");
        };

        if num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if u32::try_from(num_tasks).is_err() {
            bail!("NUM_TASKS ({num_tasks}) exceeds the supported maximum ({})", u32::MAX);
        }

        let capacity = match args.capacity {
            Some(capacity) if capacity > MAX_QUEUE_CAPACITY => {
                bail!("QUEUE_CAPACITY ({capacity}) exceeds the supported maximum ({MAX_QUEUE_CAPACITY})");
            }
            Some(capacity) => capacity,
            None => num_tasks.min(MAX_QUEUE_CAPACITY),
        };

        Ok(Self {
            num_tasks,
            num_workers,
            capacity,
            unit: Duration::from_millis(args.unit_ms),
        })
    }
}
