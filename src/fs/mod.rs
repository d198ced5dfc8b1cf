//! File system abstraction used by committers and record writers.
//!
//! The commit protocol only needs a handful of primitives: create, open,
//! rename, list and recursive delete. [`FileSystem`] captures exactly those,
//! with two implementations:
//!
//! - [`LocalFileSystem`] - the process's local disk via `std::fs`
//! - [`MemoryFileSystem`] - an in-memory fake with fault injection, for tests
//!
//! All operations are blocking. `rename` is expected to be atomic for a single
//! file, which is what makes a task's commit step all-or-nothing.

mod local;
mod memory;

pub use local::LocalFileSystem;
pub use memory::{FsOp, MemoryFileSystem};

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// One entry returned by [`FileSystem::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub is_dir: bool,
    pub len: u64,
}

impl FileStatus {
    /// Final path component as UTF-8, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Minimal blocking file system interface.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Short scheme-like name for diagnostics (`"file"`, `"memory"`).
    fn scheme(&self) -> &str;

    /// Create (or truncate) a file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parents cannot be created.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Open an existing file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Create a directory and all of its parents. Succeeds if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Move `from` to `to`, replacing an existing file at `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the move fails.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Whether a file or directory exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Whether `path` is an existing directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the type cannot be determined.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// Immediate children of `dir`, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist or is not a directory.
    fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>>;

    /// Delete a single file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be removed.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Delete `path` recursively. Succeeds if nothing exists there.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing entry cannot be removed.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Every file below `dir`, recursively, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory on the way cannot be listed.
    fn list_files_recursive(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let mut out = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(d) = pending.pop() {
            for entry in self.list(&d)? {
                if entry.is_dir {
                    pending.push(entry.path);
                } else {
                    out.push(entry);
                }
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }
}
