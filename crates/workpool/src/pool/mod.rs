mod manager;
mod worker;

#[cfg(test)]
mod tests;

pub use manager::{DEFAULT_THREAD_NAME, PoolBuilder, WorkerPool};
