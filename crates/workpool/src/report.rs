use crate::task::{TaskId, TaskReport};
use std::time::Duration;

/// Snapshot returned once every submitted task has completed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// One entry per finished task, in completion order.
    pub reports: Vec<TaskReport>,
    /// Time between `start` returning and `join` returning. `None` if the pool
    /// was never started.
    pub elapsed: Option<Duration>,
}

impl JoinReport {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Number of tasks whose work returned `Ok(())`.
    pub fn completed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    /// Tasks that failed or panicked.
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| r.outcome.is_failure())
    }

    /// `true` when every task ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_success())
    }

    /// Task ids in completion order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.reports.iter().map(|r| r.id.clone()).collect()
    }
}
