use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counts tasks that were submitted but have not completed yet.
///
/// Waiters block on a condition variable until the count drops to zero; the
/// decrement that reaches zero is the event that wakes them.
#[derive(Debug, Default)]
pub struct PendingCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl PendingCounter {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(0),
            zero: Condvar::new(),
        }
    }

    pub fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    /// Marks one task as completed and returns the remaining count.
    ///
    /// A `done` without a matching `add` is ignored; the count never goes
    /// below zero.
    pub fn done(&self) -> usize {
        let mut count = self.count.lock();
        if *count == 0 {
            return 0;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
        *count
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until the count is zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Blocks until the count is zero or `timeout` elapses. Returns `true` if
    /// the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
