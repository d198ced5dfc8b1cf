//! File output committer.
//!
//! Each task attempt writes below its own work path. Task commit moves the
//! attempt's files to the top of the output directory; job commit removes the
//! scratch tree and drops the `_SUCCESS` marker.
//!
//! | Step | Effect |
//! |---|---|
//! | [`setup_job`](FileOutputCommitter::setup_job) | create `<out>/_temporary/<app_attempt>` |
//! | [`needs_task_commit`](FileOutputCommitter::needs_task_commit) | the attempt's work path exists |
//! | [`commit_task`](FileOutputCommitter::commit_task) | move staged files to `<out>/`, drop the work path |
//! | [`abort_task`](FileOutputCommitter::abort_task) | drop the work path |
//! | [`commit_job`](FileOutputCommitter::commit_job) | drop `<out>/_temporary`, write `<out>/_SUCCESS` |
//! | [`abort_job`](FileOutputCommitter::abort_job) | drop `<out>/_temporary` |

use crate::config::{APP_ATTEMPT, Configuration, MARK_SUCCESS};
use crate::context::{JobContext, TaskAttemptContext};
use crate::error::Result as SinkResult;
use crate::fs::FileSystem;
use crate::ids::TaskAttemptId;
use crate::layout::{SUCCESS_MARKER, TEMP_DIR, job_attempt_path, temp_root};
use anyhow::{Context, Result, anyhow};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Committer scoped to one output directory and, optionally, one attempt.
#[derive(Clone, Debug)]
pub struct FileOutputCommitter {
    fs: Arc<dyn FileSystem>,
    output_dir: PathBuf,
    job_attempt_path: PathBuf,
    work_path: Option<PathBuf>,
    mark_success: bool,
}

impl FileOutputCommitter {
    /// Build a committer for `output_dir`. With an attempt, the committer can
    /// also perform the task-level steps for that attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`](crate::SinkError::Config) if committer keys are malformed.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        output_dir: impl Into<PathBuf>,
        attempt: Option<&TaskAttemptId>,
        conf: &Configuration,
    ) -> SinkResult<Self> {
        let output_dir = output_dir.into();
        let app_attempt = conf.get_parsed::<u32>(APP_ATTEMPT, 0)?;
        let mark_success = conf.get_bool(MARK_SUCCESS, true)?;
        let job_attempt_path = job_attempt_path(&output_dir, app_attempt);
        let work_path = attempt.map(|a| job_attempt_path.join(TEMP_DIR).join(a.to_string()));
        Ok(Self {
            fs,
            output_dir,
            job_attempt_path,
            work_path,
            mark_success,
        })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory the scoped attempt writes into, if this committer has one.
    #[must_use]
    pub fn work_path(&self) -> Option<&Path> {
        self.work_path.as_deref()
    }

    /// Create the job attempt directory. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn setup_job(&self, job: &JobContext) -> Result<()> {
        debug!(job = %job.job_id(), path = %self.job_attempt_path.display(), "setting up job");
        self.fs
            .create_dir_all(&self.job_attempt_path)
            .with_context(|| format!("mkdir -p {}", self.job_attempt_path.display()))
    }

    /// Whether the attempt produced anything to commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the work path cannot be inspected.
    pub fn needs_task_commit(&self, ctx: &TaskAttemptContext) -> Result<bool> {
        let work = ctx.work_path();
        self.fs
            .exists(work)
            .with_context(|| format!("stat {}", work.display()))
    }

    /// Move every staged file of the attempt to the top of the output
    /// directory, replacing files left behind by an earlier attempt, then
    /// remove the work path.
    ///
    /// # Errors
    ///
    /// Returns an error if a staged file cannot be moved or the work path
    /// cannot be removed.
    pub fn commit_task(&self, ctx: &TaskAttemptContext) -> Result<()> {
        let work = ctx.work_path();
        let staged = self
            .fs
            .list_files_recursive(work)
            .with_context(|| format!("list {}", work.display()))?;
        for file in staged {
            let rel = file
                .path
                .strip_prefix(work)
                .map_err(|_| anyhow!("{} escapes {}", file.path.display(), work.display()))?;
            let dest = self.output_dir.join(rel);
            if self.fs.exists(&dest)? {
                warn!(attempt = %ctx.attempt(), dest = %dest.display(), "replacing output of an earlier attempt");
                self.fs
                    .remove_file(&dest)
                    .with_context(|| format!("remove {}", dest.display()))?;
            }
            if let Some(parent) = dest.parent() {
                self.fs
                    .create_dir_all(parent)
                    .with_context(|| format!("mkdir -p {}", parent.display()))?;
            }
            self.fs
                .rename(&file.path, &dest)
                .with_context(|| format!("move {} to {}", file.path.display(), dest.display()))?;
            debug!(attempt = %ctx.attempt(), from = %file.path.display(), to = %dest.display(), "moved task output");
        }
        self.fs
            .remove_all(work)
            .with_context(|| format!("remove {}", work.display()))?;
        info!(attempt = %ctx.attempt(), "task committed");
        Ok(())
    }

    /// Discard the attempt's staged output.
    ///
    /// # Errors
    ///
    /// Returns an error if the work path cannot be removed.
    pub fn abort_task(&self, ctx: &TaskAttemptContext) -> Result<()> {
        let work = ctx.work_path();
        self.fs
            .remove_all(work)
            .with_context(|| format!("remove {}", work.display()))?;
        info!(attempt = %ctx.attempt(), "task aborted");
        Ok(())
    }

    /// Finish the job: remove the scratch tree and write the success marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch tree cannot be removed or the marker
    /// cannot be written.
    pub fn commit_job(&self, job: &JobContext) -> Result<()> {
        let scratch = temp_root(&self.output_dir);
        self.fs
            .remove_all(&scratch)
            .with_context(|| format!("remove {}", scratch.display()))?;
        if self.mark_success {
            let marker = self.output_dir.join(SUCCESS_MARKER);
            let mut w = self
                .fs
                .create(&marker)
                .with_context(|| format!("create {}", marker.display()))?;
            w.flush()
                .with_context(|| format!("flush {}", marker.display()))?;
        }
        info!(job = %job.job_id(), dir = %self.output_dir.display(), "job committed");
        Ok(())
    }

    /// Abandon the job: remove the scratch tree, leaving committed parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch tree cannot be removed.
    pub fn abort_job(&self, job: &JobContext) -> Result<()> {
        let scratch = temp_root(&self.output_dir);
        self.fs
            .remove_all(&scratch)
            .with_context(|| format!("remove {}", scratch.display()))?;
        warn!(job = %job.job_id(), dir = %self.output_dir.display(), "job aborted");
        Ok(())
    }
}
