//! Testing utilities for code that writes through a [`CommittingSink`](crate::CommittingSink).
//!
//! - **Assertions**: check the committed layout of an output directory
//! - **Fixtures**: small keyed datasets
//! - **Mock I/O**: temporary directories and ready-made sinks over a real or
//!   in-memory file system
//!
//! # Quick Start
//!
//! ```no_run
//! use stagecommit::testing::*;
//! use stagecommit::SinkRunner;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
//! SinkRunner::sequential().run(&sink, word_count_partitions(2))?;
//!
//! assert_job_committed(&fs, "out");
//! assert_parts(&fs, "out", &[1, 2]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
