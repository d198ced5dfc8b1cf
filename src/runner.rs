//! Drives a whole job through a sink: one task per partition, then the
//! barrier, then the job commit.

use crate::coordinator::JobCoordinator;
use crate::error::{Result, SinkError};
use crate::sink::{CommittingSink, TaskCommit, TaskOutcome};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tracing::{info, warn};

#[cfg(feature = "parallel-io")]
use rayon::prelude::*;

#[derive(Clone, Copy, Debug)]
pub enum ExecMode {
    Sequential,
    /// One rayon task per partition; `threads` defaults to the CPU count.
    Parallel { threads: Option<usize> },
}

/// Runs partitions through a [`CommittingSink`].
#[derive(Clone, Copy, Debug)]
pub struct SinkRunner {
    pub mode: ExecMode,
}

impl Default for SinkRunner {
    fn default() -> Self {
        Self {
            mode: if cfg!(feature = "parallel-io") {
                ExecMode::Parallel { threads: None }
            } else {
                ExecMode::Sequential
            },
        }
    }
}

/// What a finished job produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSummary {
    pub output_dir: PathBuf,
    /// Per-task receipts, ordered by task index.
    pub tasks: Vec<TaskCommit>,
}

impl JobSummary {
    #[must_use]
    pub fn records(&self) -> u64 {
        self.tasks.iter().map(|t| t.records).sum()
    }

    /// Final paths of the tasks that committed a file.
    #[must_use]
    pub fn committed_paths(&self) -> Vec<&PathBuf> {
        self.tasks
            .iter()
            .filter_map(|t| match &t.outcome {
                TaskOutcome::Committed { path } => Some(path),
                TaskOutcome::NothingToCommit => None,
            })
            .collect()
    }
}

impl SinkRunner {
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            mode: ExecMode::Sequential,
        }
    }

    #[must_use]
    pub fn parallel(threads: Option<usize>) -> Self {
        Self {
            mode: ExecMode::Parallel { threads },
        }
    }

    /// Write every partition as its own task and commit the job.
    ///
    /// If any task fails, the other tasks still run to completion, the job is
    /// abandoned (staging removed, no `_SUCCESS`) and
    /// [`SinkError::TasksFailed`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::TasksFailed`] if a task failed, or the job commit
    /// error from [`CommittingSink::finalize_global`].
    pub fn run<K: Send, V: Send>(
        &self,
        sink: &CommittingSink<K, V>,
        partitions: Vec<Vec<(K, V)>>,
    ) -> Result<JobSummary> {
        let total = partitions.len();
        let coord = JobCoordinator::new(total);
        info!(tasks = total, mode = ?self.mode, format = sink.format_name(), "running output job");

        match self.mode {
            ExecMode::Sequential => {
                for (i, records) in partitions.into_iter().enumerate() {
                    run_task(sink, &coord, i, total, records);
                }
            }
            #[cfg(feature = "parallel-io")]
            ExecMode::Parallel { threads } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.unwrap_or_else(num_cpus::get))
                    .build()
                    .map_err(|e| SinkError::instantiation("task thread pool", e))?;
                pool.install(|| {
                    partitions
                        .into_par_iter()
                        .enumerate()
                        .for_each(|(i, records)| run_task(sink, &coord, i, total, records));
                });
            }
            #[cfg(not(feature = "parallel-io"))]
            ExecMode::Parallel { .. } => {
                warn!("parallel-io disabled; running tasks sequentially");
                for (i, records) in partitions.into_iter().enumerate() {
                    run_task(sink, &coord, i, total, records);
                }
            }
        }

        match coord.finalize(sink) {
            Ok(tasks) => Ok(JobSummary {
                output_dir: sink.output_dir()?,
                tasks,
            }),
            Err(err @ SinkError::TasksFailed { .. }) => {
                if let Err(abort_err) = sink.abort_global() {
                    warn!(error = %abort_err, "could not abandon job after task failure");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn run_task<K, V>(
    sink: &CommittingSink<K, V>,
    coord: &JobCoordinator,
    task_index: usize,
    total: usize,
    records: Vec<(K, V)>,
) {
    let report = match write_partition(sink, task_index, total, &records) {
        Ok(commit) => coord.task_committed(&commit),
        Err(err) => coord.task_failed(task_index, &err),
    };
    if let Err(err) = report {
        warn!(task = task_index, error = %err, "coordinator rejected task report");
    }
}

fn write_partition<K, V>(
    sink: &CommittingSink<K, V>,
    task_index: usize,
    total: usize,
    records: &[(K, V)],
) -> Result<TaskCommit> {
    let mut task = sink.open(task_index, total)?;
    for record in records {
        if let Err(err) = task.write(record) {
            let attempt = task.attempt().clone();
            if let Err(abort_err) = task.abort() {
                warn!(attempt = %attempt, error = %abort_err, "abort after failed write also failed");
            }
            return Err(err);
        }
    }
    task.close()
}

/// Split keyed records into `partitions` buckets by key hash.
///
/// Records sharing a key land in the same bucket, in input order. Zero
/// partitions is treated as one.
pub fn hash_partition<K: Hash, V>(
    records: impl IntoIterator<Item = (K, V)>,
    partitions: usize,
) -> Vec<Vec<(K, V)>> {
    let n = partitions.max(1);
    let mut buckets: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
    for (k, v) in records {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        let idx = (h.finish() % n as u64) as usize;
        buckets[idx].push((k, v));
    }
    buckets
}
