//! Job, task and task-attempt identifiers.
//!
//! Attempt ids use the fixed textual form `attempt_<tracker>_<job:04>_r_<task:06>_<attempt>`
//! so staging directories line up with other writers of the same layout.

use crate::error::{Result, SinkError};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Widest task ordinal representable in an attempt id.
pub const MAX_TASK_DIGITS: usize = 6;

/// Identifier of the overall output job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct JobId {
    pub tracker: String,
    pub id: u32,
}

impl JobId {
    #[must_use]
    pub fn new(tracker: impl Into<String>, id: u32) -> Self {
        Self {
            tracker: tracker.into(),
            id,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}_{:04}", self.tracker, self.id)
    }
}

/// Phase marker embedded in task ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl TaskKind {
    fn marker(self) -> char {
        match self {
            TaskKind::Map => 'm',
            TaskKind::Reduce => 'r',
        }
    }
}

/// Identifier of one task (all attempts of it share this id).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub job: JobId,
    pub kind: TaskKind,
    /// 1-based task ordinal.
    pub ordinal: u32,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task_{}_{:04}_{}_{:06}",
            self.job.tracker,
            self.job.id,
            self.kind.marker(),
            self.ordinal
        )
    }
}

/// Identifier of one attempt of one task; scopes its staging directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskAttemptId {
    pub task: TaskId,
    pub attempt: u32,
}

impl TaskAttemptId {
    /// Attempt id for the zero-based parallel instance `task_index`.
    ///
    /// The ordinal is `task_index + 1`, the phase is reduce and the attempt
    /// counter is `0`, so the same index always maps to the same directory.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidTaskId`] when the ordinal needs more than
    /// [`MAX_TASK_DIGITS`] decimal digits.
    pub fn for_task_index(task_index: usize) -> Result<Self> {
        let ordinal = task_index
            .checked_add(1)
            .filter(|o| o.to_string().len() <= MAX_TASK_DIGITS)
            .ok_or(SinkError::InvalidTaskId { task_index })?;
        Ok(Self::for_ordinal(ordinal as u32))
    }

    pub(crate) fn for_ordinal(ordinal: u32) -> Self {
        Self {
            task: TaskId {
                job: JobId::default(),
                kind: TaskKind::Reduce,
                ordinal,
            },
            attempt: 0,
        }
    }

    /// 1-based task ordinal.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.task.ordinal
    }
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = &self.task;
        write!(
            f,
            "attempt_{}_{:04}_{}_{:06}_{}",
            task.job.tracker,
            task.job.id,
            task.kind.marker(),
            task.ordinal,
            self.attempt
        )
    }
}

fn attempt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^attempt_([^_]*)_(\d{4,})_([mr])_(\d{6})_(\d+)$").expect("attempt id pattern")
    })
}

impl FromStr for TaskAttemptId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let caps = attempt_pattern()
            .captures(s)
            .ok_or_else(|| anyhow::anyhow!("malformed task attempt id `{s}`"))?;
        let kind = if &caps[3] == "m" { TaskKind::Map } else { TaskKind::Reduce };
        Ok(Self {
            task: TaskId {
                job: JobId::new(&caps[1], caps[2].parse()?),
                kind,
                ordinal: caps[4].parse()?,
            },
            attempt: caps[5].parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_instance_encodes_ordinal_one() {
        let id = TaskAttemptId::for_task_index(0).unwrap();
        assert_eq!(id.to_string(), "attempt__0000_r_000001_0");
        assert_eq!(id.task.to_string(), "task__0000_r_000001");
        assert_eq!(JobId::default().to_string(), "job__0000");
    }

    #[test]
    fn parse_accepts_what_display_writes() {
        let id = TaskAttemptId::for_task_index(41).unwrap();
        let back: TaskAttemptId = id.to_string().parse().unwrap();
        assert_eq!(back, id);
        assert!("attempt_x_0001_q_000001_0".parse::<TaskAttemptId>().is_err());
    }
}
