//! Barrier between the last task commit and the job commit.
//!
//! Tasks report their outcome from any thread; a single caller blocks in
//! [`JobCoordinator::finalize`] until every task has reported and then runs the
//! sink's job commit once. If any task fails the barrier opens early with
//! [`SinkError::TasksFailed`] and the job is never committed.

use crate::error::{Result, SinkError};
use crate::sink::{CommittingSink, TaskCommit};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Report {
    Committed(TaskCommit),
    Failed(String),
}

#[derive(Debug)]
struct Progress {
    reports: Vec<Option<Report>>,
    pending: usize,
    failed: usize,
}

impl Progress {
    fn settled(&self) -> bool {
        self.pending == 0 || self.failed > 0
    }
}

/// Collects task reports and releases the job commit once all are in.
#[derive(Debug)]
pub struct JobCoordinator {
    total_tasks: usize,
    progress: Mutex<Progress>,
    settled: Condvar,
}

impl JobCoordinator {
    #[must_use]
    pub fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            progress: Mutex::new(Progress {
                reports: (0..total_tasks).map(|_| None).collect(),
                pending: total_tasks,
                failed: 0,
            }),
            settled: Condvar::new(),
        }
    }

    #[must_use]
    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, task_index: usize, report: Report) -> Result<()> {
        let mut progress = self.lock();
        let slot = progress
            .reports
            .get_mut(task_index)
            .ok_or(SinkError::UnexpectedReport {
                task_index,
                reason: "index out of range",
            })?;
        if slot.is_some() {
            return Err(SinkError::UnexpectedReport {
                task_index,
                reason: "already reported",
            });
        }
        let failed = matches!(report, Report::Failed(_));
        *slot = Some(report);
        progress.pending -= 1;
        if failed {
            progress.failed += 1;
        }
        if progress.settled() {
            self.settled.notify_all();
        }
        Ok(())
    }

    /// Report a successfully closed task.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::UnexpectedReport`] if the index is out of range
    /// or was already reported.
    pub fn task_committed(&self, commit: &TaskCommit) -> Result<()> {
        debug!(task = commit.task_index, attempt = %commit.attempt, "task reported committed");
        self.record(commit.task_index, Report::Committed(commit.clone()))
    }

    /// Report a task that failed at any step.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::UnexpectedReport`] if the index is out of range
    /// or was already reported.
    pub fn task_failed(&self, task_index: usize, error: &SinkError) -> Result<()> {
        warn!(task = task_index, error = %error, "task reported failed");
        self.record(task_index, Report::Failed(error.to_string()))
    }

    /// Block until every task committed or any task failed.
    ///
    /// Returns the commits ordered by task index.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::TasksFailed`] listing the failed indices reported
    /// so far.
    pub fn wait_all(&self) -> Result<Vec<TaskCommit>> {
        let progress = self
            .settled
            .wait_while(self.lock(), |p| !p.settled())
            .unwrap_or_else(PoisonError::into_inner);

        if progress.failed > 0 {
            let failed = progress
                .reports
                .iter()
                .enumerate()
                .filter_map(|(i, r)| match r {
                    Some(Report::Failed(reason)) => {
                        debug!(task = i, reason = %reason, "failed task");
                        Some(i)
                    }
                    _ => None,
                })
                .collect();
            return Err(SinkError::TasksFailed { failed });
        }

        Ok(progress
            .reports
            .iter()
            .filter_map(|r| match r {
                Some(Report::Committed(commit)) => Some(commit.clone()),
                _ => None,
            })
            .collect())
    }

    /// Wait for all tasks, then commit the job exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::TasksFailed`] without touching the output if any
    /// task failed, otherwise whatever
    /// [`finalize_global`](CommittingSink::finalize_global) returns.
    pub fn finalize<K, V>(&self, sink: &CommittingSink<K, V>) -> Result<Vec<TaskCommit>> {
        let commits = self.wait_all()?;
        info!(tasks = self.total_tasks, "all tasks committed");
        sink.finalize_global(self.total_tasks)?;
        Ok(commits)
    }
}
