//! Job and task-attempt contexts handed to committers and record writers.

use crate::config::Configuration;
use crate::ids::{JobId, TaskAttemptId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Job-scoped view: the job id plus the shared configuration snapshot.
#[derive(Clone, Debug)]
pub struct JobContext {
    job_id: JobId,
    conf: Arc<Configuration>,
}

impl JobContext {
    #[must_use]
    pub fn new(conf: Arc<Configuration>, job_id: JobId) -> Self {
        Self { job_id, conf }
    }

    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }
}

/// Everything one task attempt needs to find its staging area.
///
/// Built once per opened task and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct TaskAttemptContext {
    conf: Arc<Configuration>,
    attempt: TaskAttemptId,
    total_tasks: usize,
    work_path: PathBuf,
}

impl TaskAttemptContext {
    #[must_use]
    pub fn new(
        conf: Arc<Configuration>,
        attempt: TaskAttemptId,
        total_tasks: usize,
        work_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            conf,
            attempt,
            total_tasks,
            work_path: work_path.into(),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    #[must_use]
    pub fn attempt(&self) -> &TaskAttemptId {
        &self.attempt
    }

    /// 1-based partition number of this task.
    #[must_use]
    pub fn partition(&self) -> u32 {
        self.attempt.ordinal()
    }

    #[must_use]
    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    /// Private directory this attempt writes into before commit.
    #[must_use]
    pub fn work_path(&self) -> &Path {
        &self.work_path
    }

    /// Job context sharing this attempt's configuration and job id.
    #[must_use]
    pub fn job_context(&self) -> JobContext {
        JobContext::new(Arc::clone(&self.conf), self.attempt.task.job.clone())
    }
}
