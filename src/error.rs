//! Error taxonomy for the commit protocol.
//!
//! Every protocol step maps its failure onto one [`SinkError`] variant. Causes
//! coming from collaborators (file system, record writers, codecs) travel as
//! [`anyhow::Error`] chains so the original context is kept intact.

use crate::ids::TaskAttemptId;
use thiserror::Error;

/// Errors raised by the committing sink and its coordinator.
///
/// None of these are retried internally. The caller decides whether to rerun
/// a task or the whole job.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The 1-based task ordinal does not fit the six-digit attempt encoding.
    #[error("task id too large: index {task_index} does not fit a 6-digit attempt id")]
    InvalidTaskId { task_index: usize },

    /// A context, committer or record writer could not be built.
    #[error("could not instantiate {what}")]
    Instantiation {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    /// The record writer failed to accept a record.
    #[error("could not write record for {attempt}")]
    WriteFailed {
        attempt: TaskAttemptId,
        #[source]
        source: anyhow::Error,
    },

    /// Closing the record writer or committing the task failed.
    #[error("task commit failed for {attempt}")]
    CommitFailed {
        attempt: TaskAttemptId,
        #[source]
        source: anyhow::Error,
    },

    /// The global job commit failed; task outputs may already be visible.
    #[error("job commit failed for {output_dir}")]
    JobCommitFailed {
        output_dir: String,
        #[source]
        source: anyhow::Error,
    },

    /// `finalize_global` was already invoked on this sink.
    #[error("job output was already finalized")]
    AlreadyFinalized,

    /// One or more tasks reported a failure before the finalize barrier.
    #[error("{} task(s) failed before finalize: {failed:?}", failed.len())]
    TasksFailed { failed: Vec<usize> },

    /// The coordinator received a report it cannot accept.
    #[error("rejected report for task {task_index}: {reason}")]
    UnexpectedReport { task_index: usize, reason: &'static str },

    /// No output format is registered under the requested name.
    #[error("unknown output format `{0}`")]
    UnknownFormat(String),

    /// A configuration value is missing or malformed.
    #[error("invalid configuration for `{key}`: {message}")]
    Config { key: String, message: String },

    /// A serialized sink descriptor could not be encoded or decoded.
    #[error("invalid sink descriptor")]
    Descriptor(#[source] anyhow::Error),
}

impl SinkError {
    pub(crate) fn instantiation(what: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Instantiation {
            what: what.into(),
            source: source.into(),
        }
    }

    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error was raised by the job-level step rather than by a task.
    #[must_use]
    pub fn is_job_level(&self) -> bool {
        matches!(
            self,
            Self::JobCommitFailed { .. } | Self::AlreadyFinalized | Self::TasksFailed { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SinkError> = std::result::Result<T, E>;
