//! In-memory [`FileSystem`] for tests.
//!
//! Files are shared byte buffers keyed by path; directories are tracked
//! explicitly and implied by the files beneath them. Faults can be injected
//! per operation and path fragment to exercise the commit error paths.

use super::{FileStatus, FileSystem};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type FileBuffer = Arc<Mutex<Vec<u8>>>;

/// Operation kinds that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsOp {
    Create,
    Write,
    Rename,
    Remove,
    CreateDir,
    List,
}

#[derive(Default, Debug)]
struct State {
    files: BTreeMap<PathBuf, FileBuffer>,
    dirs: BTreeSet<PathBuf>,
    faults: Vec<(FsOp, String)>,
}

impl State {
    fn check(&self, op: FsOp, path: &Path) -> io::Result<()> {
        let shown = path.to_string_lossy();
        match self
            .faults
            .iter()
            .find(|(o, fragment)| *o == op && shown.contains(fragment.as_str()))
        {
            Some(_) => Err(io::Error::other(format!("injected {op:?} fault at {shown}"))),
            None => Ok(()),
        }
    }

    fn add_dirs(&mut self, path: &Path) {
        for dir in path.ancestors() {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}

/// In-memory file system; clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<State>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on a path containing `fragment` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_on(&self, op: FsOp, fragment: impl Into<String>) {
        self.lock().faults.push((op, fragment.into()));
    }

    /// Remove all injected faults.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Contents of a file, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.lock();
        let buf = state.files.get(path.as_ref())?;
        let bytes = buf.lock().expect("file buffer mutex poisoned").clone();
        Some(bytes)
    }

    /// Every file path currently stored, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory fs mutex poisoned")
    }
}

/// Writer appending into a shared file buffer.
struct MemoryWriter {
    buf: FileBuffer,
    fail_writes: Option<String>,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(path) = &self.fail_writes {
            return Err(io::Error::other(format!("injected Write fault at {path}")));
        }
        self.buf
            .lock()
            .map_err(|_| io::Error::other("file buffer mutex poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

impl FileSystem for MemoryFileSystem {
    fn scheme(&self) -> &str {
        "memory"
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let mut state = self.lock();
        state.check(FsOp::Create, path)?;
        if state.is_dir(path) {
            return Err(io::Error::other(format!("{} is a directory", path.display())));
        }
        if let Some(parent) = path.parent() {
            state.add_dirs(parent);
        }
        let buf = FileBuffer::default();
        state.files.insert(path.to_path_buf(), Arc::clone(&buf));
        let fail_writes = state
            .check(FsOp::Write, path)
            .err()
            .map(|_| path.display().to_string());
        Ok(Box::new(MemoryWriter { buf, fail_writes }))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let state = self.lock();
        let buf = state.files.get(path).ok_or_else(|| not_found(path))?;
        let bytes = buf
            .lock()
            .map_err(|_| io::Error::other("file buffer mutex poisoned"))?
            .clone();
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(FsOp::CreateDir, path)?;
        if state.files.contains_key(path) {
            return Err(io::Error::other(format!("{} is a file", path.display())));
        }
        state.add_dirs(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(FsOp::Rename, from)?;
        if let Some(parent) = to.parent()
            && !parent.as_os_str().is_empty()
            && !state.is_dir(parent)
        {
            return Err(not_found(parent));
        }
        if let Some(buf) = state.files.remove(from) {
            state.files.insert(to.to_path_buf(), buf);
            return Ok(());
        }
        if !state.is_dir(from) {
            return Err(not_found(from));
        }
        if state.files.contains_key(to) {
            return Err(io::Error::other(format!("{} is a file", to.display())));
        }
        let moved_files: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_files {
            if let (Some(buf), Ok(rest)) = (state.files.remove(&old), old.strip_prefix(from)) {
                state.files.insert(to.join(rest), buf);
            }
        }
        let moved_dirs: Vec<PathBuf> = state
            .dirs
            .iter()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_dirs {
            state.dirs.remove(&old);
            if let Ok(rest) = old.strip_prefix(from) {
                let new = to.join(rest);
                state.dirs.insert(new);
            }
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        let state = self.lock();
        Ok(state.files.contains_key(path) || state.is_dir(path))
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(self.lock().is_dir(path))
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let state = self.lock();
        state.check(FsOp::List, dir)?;
        if !state.is_dir(dir) {
            return Err(not_found(dir));
        }
        let mut out: Vec<FileStatus> = state
            .dirs
            .iter()
            .filter(|p| p.parent() == Some(dir))
            .map(|p| FileStatus {
                path: p.clone(),
                is_dir: true,
                len: 0,
            })
            .collect();
        for (path, buf) in &state.files {
            if path.parent() == Some(dir) {
                let len = buf.lock().map(|b| b.len() as u64).unwrap_or_default();
                out.push(FileStatus {
                    path: path.clone(),
                    is_dir: false,
                    len,
                });
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(FsOp::Remove, path)?;
        state.files.remove(path).map(drop).ok_or_else(|| not_found(path))
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(FsOp::Remove, path)?;
        state.files.retain(|p, _| !p.starts_with(path));
        state.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }
}
