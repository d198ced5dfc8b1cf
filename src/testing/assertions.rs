//! Assertions over the layout of an output directory.
//!
//! All functions panic with a listing of the directory when they fail.

use crate::fs::FileSystem;
use crate::layout::{SUCCESS_MARKER, committed_parts, temp_root};
use std::path::Path;

fn listing(fs: &dyn FileSystem, dir: &Path) -> Vec<String> {
    fs.list_files_recursive(dir)
        .map(|files| files.into_iter().map(|f| f.path.display().to_string()).collect())
        .unwrap_or_default()
}

/// Assert that `dir` holds exactly the committed parts `expected` (by ordinal).
///
/// # Panics
///
/// Panics if the directory cannot be listed or the ordinals differ.
pub fn assert_parts(fs: &dyn FileSystem, dir: impl AsRef<Path>, expected: &[u32]) {
    let dir = dir.as_ref();
    let parts = committed_parts(fs, dir)
        .unwrap_or_else(|e| panic!("cannot list {}: {e:#}", dir.display()));
    let ordinals: Vec<u32> = parts.iter().map(|(o, _)| *o).collect();
    assert_eq!(
        ordinals,
        expected,
        "Committed parts mismatch in {}:\n  Expected: {expected:?}\n  Actual: {ordinals:?}\n  Files: {:?}",
        dir.display(),
        listing(fs, dir)
    );
}

/// Assert that the job in `dir` was committed: `_SUCCESS` exists and no
/// staging is left.
///
/// # Panics
///
/// Panics if either condition does not hold.
pub fn assert_job_committed(fs: &dyn FileSystem, dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    assert!(
        fs.exists(&dir.join(SUCCESS_MARKER)).unwrap_or(false),
        "Missing {SUCCESS_MARKER} in {}:\n  Files: {:?}",
        dir.display(),
        listing(fs, dir)
    );
    assert_no_staging(fs, dir);
}

/// Assert that the job in `dir` was not committed.
///
/// # Panics
///
/// Panics if `_SUCCESS` exists.
pub fn assert_job_not_committed(fs: &dyn FileSystem, dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    assert!(
        !fs.exists(&dir.join(SUCCESS_MARKER)).unwrap_or(false),
        "Unexpected {SUCCESS_MARKER} in {}:\n  Files: {:?}",
        dir.display(),
        listing(fs, dir)
    );
}

/// Assert that `dir` has no staging tree.
///
/// # Panics
///
/// Panics if `<dir>/_temporary` exists.
pub fn assert_no_staging(fs: &dyn FileSystem, dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    let scratch = temp_root(dir);
    assert!(
        !fs.exists(&scratch).unwrap_or(true),
        "Staging left behind in {}:\n  Files: {:?}",
        dir.display(),
        listing(fs, dir)
    );
}
