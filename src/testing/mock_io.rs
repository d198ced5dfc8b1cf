//! Temporary directories and pre-wired sinks for tests.

use crate::config::Configuration;
use crate::error::Result;
use crate::format::{FormatRegistry, RecordBound};
use crate::fs::{LocalFileSystem, MemoryFileSystem};
use crate::sink::CommittingSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary directory that is automatically deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path within this directory. Nothing is created.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }
}

impl Default for TempDirPath {
    fn default() -> Self {
        Self::new().expect("Failed to create temporary directory")
    }
}

/// A sink of the standard format `format` writing to `output_dir` on the
/// local file system.
///
/// # Errors
///
/// Returns an error if the format is unknown.
pub fn local_sink<K: RecordBound, V: RecordBound>(
    format: &str,
    output_dir: impl AsRef<Path>,
) -> Result<CommittingSink<K, V>> {
    local_sink_with(format, Configuration::for_output_dir(output_dir))
}

/// Like [`local_sink`] with a full configuration.
///
/// # Errors
///
/// Returns an error if the format is unknown or the configuration has no
/// output directory.
pub fn local_sink_with<K: RecordBound, V: RecordBound>(
    format: &str,
    conf: Configuration,
) -> Result<CommittingSink<K, V>> {
    CommittingSink::new(
        format,
        FormatRegistry::standard().create(format, &conf)?,
        conf,
        Arc::new(LocalFileSystem),
    )
}

/// A sink of the standard format `format` writing to `output_dir` in a fresh
/// [`MemoryFileSystem`]. The returned handle shares state with the sink, so it
/// can inspect output and inject faults.
///
/// # Errors
///
/// Returns an error if the format is unknown.
pub fn memory_sink<K: RecordBound, V: RecordBound>(
    format: &str,
    output_dir: impl AsRef<Path>,
) -> Result<(MemoryFileSystem, CommittingSink<K, V>)> {
    memory_sink_with(format, Configuration::for_output_dir(output_dir))
}

/// Like [`memory_sink`] with a full configuration.
///
/// # Errors
///
/// Returns an error if the format is unknown or the configuration has no
/// output directory.
pub fn memory_sink_with<K: RecordBound, V: RecordBound>(
    format: &str,
    conf: Configuration,
) -> Result<(MemoryFileSystem, CommittingSink<K, V>)> {
    let fs = MemoryFileSystem::new();
    let sink = CommittingSink::new(
        format,
        FormatRegistry::standard().create(format, &conf)?,
        conf,
        Arc::new(fs.clone()),
    )?;
    Ok((fs, sink))
}
