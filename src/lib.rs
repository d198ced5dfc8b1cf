//! # Stagecommit
//!
//! A **two-phase committing output sink** for parallel batch writers.
//!
//! Many parallel tasks write key-value records into one output directory.
//! Each task stages its records privately and commits them on close; once
//! every task has closed, a single global step commits the job. Readers of the
//! output directory never observe a half-written part, and `_SUCCESS` marks a
//! complete job.
//!
//! ## Key Features
//!
//! - **Task commit** - each task's output appears atomically as `<out>/<n>`,
//!   where `n` is the task's 1-based ordinal
//! - **Job commit** - one global step removes staging and writes `_SUCCESS`
//! - **Pluggable formats** - text, JSON Lines and CSV, or your own
//!   [`OutputFormat`] registered in a [`FormatRegistry`]
//! - **Compression** - gzip, zstd, bzip2 and xz behind feature flags
//! - **Portable sinks** - a [`SinkDescriptor`] ships a sink's format and
//!   configuration to a worker as checksummed bytes
//! - **Sequential and parallel runners** - [`SinkRunner`] drives a whole job,
//!   including the barrier before the job commit
//!
//! ## Quick Start
//!
//! ```no_run
//! use stagecommit::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let conf = Configuration::for_output_dir("/tmp/counts")
//!     .with(config::OUTPUT_COMPRESSION, "gzip");
//! let sink = CommittingSink::<String, u64>::from_registry(
//!     "jsonl",
//!     &FormatRegistry::standard(),
//!     conf,
//!     Arc::new(LocalFileSystem),
//! )?;
//!
//! let partitions = runner::hash_partition(
//!     vec![("a".to_string(), 1), ("b".to_string(), 2), ("a".to_string(), 3)],
//!     2,
//! );
//! let summary = SinkRunner::default().run(&sink, partitions)?;
//! println!("{} records in {:?}", summary.records(), summary.committed_paths());
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving tasks yourself
//!
//! An engine that schedules its own parallel instances calls
//! [`CommittingSink::open`] once per instance and reports each result to a
//! shared [`JobCoordinator`], which runs the job commit after the last report:
//!
//! ```no_run
//! use stagecommit::*;
//! use std::thread;
//!
//! # fn main() -> anyhow::Result<()> {
//! # let (_fs, sink) = testing::memory_sink::<String, u64>("text", "out")?;
//! let coord = JobCoordinator::new(2);
//! thread::scope(|s| {
//!     for task in 0..2 {
//!         let (sink, coord) = (&sink, &coord);
//!         s.spawn(move || {
//!             let result = sink.open(task, 2).and_then(|mut w| {
//!                 w.write_record(&format!("key-{task}"), &1)?;
//!                 w.close()
//!             });
//!             match result {
//!                 Ok(commit) => coord.task_committed(&commit),
//!                 Err(e) => coord.task_failed(task, &e),
//!             }
//!         });
//!     }
//! });
//! coord.finalize(&sink)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Output layout
//!
//! ```text
//! <out>/_temporary/0/_temporary/attempt__0000_r_000001_0/tmp-r-00001   staged by task 0
//! <out>/1                                                              committed by task 0
//! <out>/_SUCCESS                                                       written by the job commit
//! ```
//!
//! ## Configuration
//!
//! See [`config`] for the recognised keys. Setting `STAGECOMMIT_CONF` to a JSON
//! file of string pairs supplies site-wide defaults to
//! [`CommittingSink::from_registry`].
//!
//! ## Logging
//!
//! Protocol steps emit `tracing` events; install any subscriber to see them.

pub mod committer;
pub mod compression;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod fs;
pub mod ids;
pub mod layout;
pub mod runner;
pub mod sink;
pub mod testing;

pub use committer::FileOutputCommitter;
pub use config::Configuration;
pub use context::{JobContext, TaskAttemptContext};
pub use coordinator::JobCoordinator;
pub use descriptor::SinkDescriptor;
pub use error::{Result, SinkError};
pub use format::{FormatRegistry, OutputFormat, RecordBound, RecordWriter, StagedPart};
pub use fs::{FileStatus, FileSystem, LocalFileSystem, MemoryFileSystem};
pub use ids::{JobId, TaskAttemptId, TaskId, TaskKind};
pub use runner::{ExecMode, JobSummary, SinkRunner};
pub use sink::{CommittingSink, TaskCommit, TaskOutcome, TaskState, TaskWriter};
