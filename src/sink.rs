//! The two-phase committing output sink.
//!
//! A [`CommittingSink`] is shared by every parallel instance of an output
//! operator. Each instance calls [`open`](CommittingSink::open) to obtain its
//! own [`TaskWriter`], writes records, and [`close`](TaskWriter::close)s it,
//! which commits the task. After all instances closed, exactly one caller runs
//! [`finalize_global`](CommittingSink::finalize_global) to commit the job.
//!
//! ```no_run
//! use stagecommit::{CommittingSink, Configuration, FormatRegistry, LocalFileSystem};
//! use std::sync::Arc;
//! # fn main() -> stagecommit::Result<()> {
//!
//! let conf = Configuration::for_output_dir("/tmp/word-counts");
//! let sink = CommittingSink::<String, u64>::from_registry(
//!     "text",
//!     &FormatRegistry::standard(),
//!     conf,
//!     Arc::new(LocalFileSystem),
//! )?;
//!
//! let mut task = sink.open(0, 1)?;
//! task.write_record(&"hello".to_string(), &2)?;
//! task.close()?;
//!
//! sink.finalize_global(1)?;
//! # Ok(())
//! # }
//! ```

use crate::committer::FileOutputCommitter;
use crate::compression::extension_for;
use crate::config::{Configuration, LOG_LISTINGS, OUTPUT_COMPRESSION};
use crate::context::{JobContext, TaskAttemptContext};
use crate::descriptor::SinkDescriptor;
use crate::error::{Result, SinkError};
use crate::format::{FormatRegistry, OutputFormat, RecordWriter};
use crate::fs::FileSystem;
use crate::ids::{JobId, TaskAttemptId};
use crate::layout::{committed_file_name, log_directory, staged_file_name};
use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Ordinal used for the synthetic task context of the job-level commit.
const FINALIZE_ORDINAL: u32 = 1;

/// Output sink running the task/job commit protocol over a wrapped format.
pub struct CommittingSink<K, V> {
    format_name: String,
    format: Arc<dyn OutputFormat<K, V>>,
    conf: Arc<Configuration>,
    fs: Arc<dyn FileSystem>,
    finalized: AtomicBool,
}

impl<K, V> fmt::Debug for CommittingSink<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittingSink")
            .field("format", &self.format_name)
            .field("conf", &self.conf)
            .field("fs", &self.fs.scheme())
            .field("finalized", &self.finalized.load(Ordering::Acquire))
            .finish()
    }
}

impl<K, V> CommittingSink<K, V> {
    /// Wrap an already-built format. `format_name` is what a
    /// [`SinkDescriptor`] records to rebuild the format elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the output directory is not configured.
    pub fn new(
        format_name: impl Into<String>,
        format: Arc<dyn OutputFormat<K, V>>,
        conf: Configuration,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        conf.output_dir()?;
        Ok(Self {
            format_name: format_name.into(),
            format,
            conf: Arc::new(conf),
            fs,
            finalized: AtomicBool::new(false),
        })
    }

    /// Build the sink with the format registered under `format_name`.
    ///
    /// The configuration is filled with site defaults from
    /// [`SITE_CONF_ENV`](crate::config::SITE_CONF_ENV) first.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::UnknownFormat`] or [`SinkError::Instantiation`] if
    /// the format cannot be built, and [`SinkError::Config`] for bad settings.
    pub fn from_registry(
        format_name: &str,
        registry: &FormatRegistry<K, V>,
        conf: Configuration,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let conf = conf.with_site_overlay()?;
        let format = registry.create(format_name, &conf)?;
        Self::new(format_name, format, conf, fs)
    }

    /// Rebuild a sink from its serialized description.
    ///
    /// # Errors
    ///
    /// Same as [`from_registry`](Self::from_registry).
    pub fn from_descriptor(
        descriptor: &SinkDescriptor,
        registry: &FormatRegistry<K, V>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let format = registry.create(&descriptor.format, &descriptor.configuration)?;
        Self::new(
            descriptor.format.clone(),
            format,
            descriptor.configuration.clone(),
            fs,
        )
    }

    /// Everything needed to rebuild this sink on another worker.
    #[must_use]
    pub fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor {
            format: self.format_name.clone(),
            configuration: (*self.conf).clone(),
        }
    }

    /// Merge engine parameters over the sink configuration.
    ///
    /// Must happen before any task is opened; the result is a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the merged configuration has no
    /// output directory.
    pub fn configure(self, params: &Configuration) -> Result<Self> {
        let conf = self.conf.merged(params);
        conf.output_dir()?;
        Ok(Self {
            conf: Arc::new(conf),
            ..self
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    #[must_use]
    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// The configured output directory.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if it is not set.
    pub fn output_dir(&self) -> Result<PathBuf> {
        self.conf.output_dir()
    }

    /// Whether [`finalize_global`](Self::finalize_global) was already called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn log_listings(&self) -> bool {
        self.conf.get_bool(LOG_LISTINGS, true).unwrap_or(true)
    }

    /// Open parallel instance `task_index` of `total_tasks`.
    ///
    /// Sets up the job (idempotent), derives the attempt's private work path
    /// and asks the wrapped format for a record writer bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidTaskId`] if the index does not fit the
    /// attempt encoding, and [`SinkError::Instantiation`] if the committer or
    /// record writer cannot be built.
    pub fn open(&self, task_index: usize, total_tasks: usize) -> Result<TaskWriter<K, V>> {
        let attempt = TaskAttemptId::for_task_index(task_index)?;
        let output_dir = self.conf.output_dir()?;
        info!(
            attempt = %attempt,
            total_tasks,
            dir = %output_dir.display(),
            format = self.format.name(),
            "opening output task"
        );

        let committer = FileOutputCommitter::new(Arc::clone(&self.fs), &output_dir, Some(&attempt), &self.conf)?;
        let work_path = committer
            .work_path()
            .map(Path::to_path_buf)
            .context("task committer has no work path")
            .map_err(|e| SinkError::instantiation("task attempt context", e))?;
        let ctx = TaskAttemptContext::new(Arc::clone(&self.conf), attempt, total_tasks, work_path);

        committer
            .setup_job(&ctx.job_context())
            .map_err(|e| SinkError::instantiation("job setup", e))?;

        let writer = self
            .format
            .record_writer(Arc::clone(&self.fs), &ctx)
            .map_err(|e| SinkError::instantiation(format!("record writer for {}", ctx.attempt()), e))?;

        if self.log_listings() {
            log_directory(self.fs.as_ref(), &output_dir);
        }

        Ok(TaskWriter {
            ctx,
            committer,
            writer: Some(writer),
            fs: Arc::clone(&self.fs),
            output_dir,
            state: TaskState::Opened,
            records: 0,
            log_listings: self.log_listings(),
        })
    }

    /// Commit the job once every task closed successfully.
    ///
    /// Builds a fresh job context and a synthetic task context and runs the
    /// committer's job commit. Single-shot: later calls fail with
    /// [`SinkError::AlreadyFinalized`] without touching the file system, even
    /// when the first call failed.
    ///
    /// The caller must guarantee that every task closed before this runs;
    /// [`JobCoordinator`](crate::coordinator::JobCoordinator) does that.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::JobCommitFailed`] if the commit fails.
    pub fn finalize_global(&self, parallelism: usize) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(SinkError::AlreadyFinalized);
        }
        let output_dir = self.conf.output_dir()?;
        info!(dir = %output_dir.display(), parallelism, "finalizing output");

        let attempt = TaskAttemptId::for_ordinal(FINALIZE_ORDINAL);
        let job = JobContext::new(Arc::clone(&self.conf), JobId::default());
        let committer = FileOutputCommitter::new(Arc::clone(&self.fs), &output_dir, Some(&attempt), &self.conf)?;
        let job_failed = |source: anyhow::Error| SinkError::JobCommitFailed {
            output_dir: output_dir.display().to_string(),
            source,
        };
        committer.commit_job(&job).map_err(job_failed)?;

        if self.log_listings() {
            log_directory(self.fs.as_ref(), &output_dir);
        }
        Ok(())
    }

    /// Abandon the job after a task failure: drop all staging, keep whatever
    /// tasks already committed and never write `_SUCCESS`.
    ///
    /// Consumes the single finalize slot, so a later
    /// [`finalize_global`](Self::finalize_global) is refused.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::AlreadyFinalized`] if the job was already
    /// finalized or abandoned, and [`SinkError::JobCommitFailed`] if the
    /// staging tree cannot be removed.
    pub fn abort_global(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(SinkError::AlreadyFinalized);
        }
        let output_dir = self.conf.output_dir()?;
        let job = JobContext::new(Arc::clone(&self.conf), JobId::default());
        let committer = FileOutputCommitter::new(Arc::clone(&self.fs), &output_dir, None, &self.conf)?;
        committer
            .abort_job(&job)
            .map_err(|source| SinkError::JobCommitFailed {
                output_dir: output_dir.display().to_string(),
                source,
            })
    }
}

/// Lifecycle state of an open task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Opened, nothing written yet.
    Opened,
    /// At least one record written.
    Writing,
    /// A write failed; the task can only be aborted or closed with an error.
    Failed,
}

/// How a closed task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The staged file was renamed to its final path.
    Committed { path: PathBuf },
    /// The task staged nothing (e.g. a lazy, empty partition).
    NothingToCommit,
}

/// Receipt returned by [`TaskWriter::close`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskCommit {
    pub task_index: usize,
    pub attempt: TaskAttemptId,
    pub records: u64,
    pub outcome: TaskOutcome,
}

/// One open parallel instance of the sink.
///
/// Closing consumes the writer, so a task can be committed at most once.
pub struct TaskWriter<K, V> {
    ctx: TaskAttemptContext,
    committer: FileOutputCommitter,
    writer: Option<Box<dyn RecordWriter<K, V>>>,
    fs: Arc<dyn FileSystem>,
    output_dir: PathBuf,
    state: TaskState,
    records: u64,
    log_listings: bool,
}

impl<K, V> fmt::Debug for TaskWriter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWriter")
            .field("attempt", &self.ctx.attempt().to_string())
            .field("state", &self.state)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl<K, V> TaskWriter<K, V> {
    #[must_use]
    pub fn attempt(&self) -> &TaskAttemptId {
        self.ctx.attempt()
    }

    #[must_use]
    pub fn context(&self) -> &TaskAttemptContext {
        &self.ctx
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Zero-based index this task was opened with.
    #[must_use]
    pub fn task_index(&self) -> usize {
        self.ctx.partition() as usize - 1
    }

    /// Append one record to the task's staged output.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::WriteFailed`] if the record writer fails, or if an
    /// earlier write already failed.
    pub fn write_record(&mut self, key: &K, value: &V) -> Result<()> {
        let attempt = self.ctx.attempt();
        let writer = match (self.state, self.writer.as_mut()) {
            (TaskState::Failed, _) | (_, None) => {
                return Err(SinkError::WriteFailed {
                    attempt: attempt.clone(),
                    source: anyhow::anyhow!("task already failed"),
                });
            }
            (_, Some(w)) => w,
        };
        match writer.write(key, value) {
            Ok(()) => {
                self.state = TaskState::Writing;
                self.records += 1;
                Ok(())
            }
            Err(source) => {
                self.state = TaskState::Failed;
                Err(SinkError::WriteFailed {
                    attempt: attempt.clone(),
                    source,
                })
            }
        }
    }

    /// Append a `(key, value)` tuple.
    ///
    /// # Errors
    ///
    /// See [`write_record`](Self::write_record).
    pub fn write(&mut self, record: &(K, V)) -> Result<()> {
        self.write_record(&record.0, &record.1)
    }

    /// Close the record writer and commit the task.
    ///
    /// The staged file is moved out of the work path and renamed to the task's
    /// 1-based ordinal. A task that staged nothing closes without committing.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::CommitFailed`] if closing the writer, the task
    /// commit or the final rename fails, or if a write failed earlier.
    pub fn close(mut self) -> Result<TaskCommit> {
        let attempt = self.ctx.attempt().clone();
        let commit_failed = |source: anyhow::Error| SinkError::CommitFailed {
            attempt: attempt.clone(),
            source,
        };
        if self.state == TaskState::Failed {
            return Err(commit_failed(anyhow::anyhow!("cannot commit after a failed write")));
        }
        debug!(attempt = %attempt, records = self.records, "closing output task");

        if let Some(writer) = self.writer.take() {
            writer.close().map_err(commit_failed)?;
        }

        let needs_commit = self
            .committer
            .needs_task_commit(&self.ctx)
            .map_err(commit_failed)?;
        if needs_commit {
            self.committer.commit_task(&self.ctx).map_err(commit_failed)?;
        }

        if self.log_listings {
            log_directory(self.fs.as_ref(), &self.output_dir);
        }

        let outcome = self.rename_to_final().map_err(commit_failed)?;
        Ok(TaskCommit {
            task_index: self.task_index(),
            attempt,
            records: self.records,
            outcome,
        })
    }

    fn rename_to_final(&self) -> anyhow::Result<TaskOutcome> {
        let ordinal = self.ctx.partition();
        let extension = extension_for(self.ctx.configuration().get(OUTPUT_COMPRESSION))?;
        let staged = self.output_dir.join(staged_file_name(ordinal, &extension));
        let committed = self.output_dir.join(committed_file_name(ordinal, &extension));

        if !self.fs.exists(&staged)? {
            warn!(attempt = %self.ctx.attempt(), staged = %staged.display(), "staged output does not exist; nothing to rename");
            return Ok(TaskOutcome::NothingToCommit);
        }
        info!(from = %staged.display(), to = %committed.display(), "renaming task output");
        self.fs
            .rename(&staged, &committed)
            .with_context(|| format!("rename {} to {}", staged.display(), committed.display()))?;
        Ok(TaskOutcome::Committed { path: committed })
    }

    /// Discard everything this attempt staged.
    ///
    /// Committed files of other tasks are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::CommitFailed`] if the work path cannot be removed.
    pub fn abort(mut self) -> Result<()> {
        let attempt = self.ctx.attempt().clone();
        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.close()
        {
            debug!(attempt = %attempt, error = %e, "ignoring writer close error during abort");
        }
        self.committer
            .abort_task(&self.ctx)
            .map_err(|source| SinkError::CommitFailed { attempt, source })
    }
}
