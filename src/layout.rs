//! On-disk layout of a committed output directory.
//!
//! ```text
//! <out>/
//!   _temporary/<app_attempt>/_temporary/<attempt id>/tmp-r-00001   while task 1 writes
//!   1, 2, ... N                                                    after each task commits
//!   _SUCCESS                                                       after job commit
//! ```

use crate::fs::FileSystem;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Scratch directory holding every uncommitted attempt.
pub const TEMP_DIR: &str = "_temporary";
/// Marker written by a successful job commit.
pub const SUCCESS_MARKER: &str = "_SUCCESS";
/// Base name of staged part files.
pub const STAGED_BASENAME: &str = "tmp";

/// Name a record writer gives its part file inside the work path.
#[must_use]
pub fn staged_file_name(ordinal: u32, extension: &str) -> String {
    format!("{STAGED_BASENAME}-r-{ordinal:05}{extension}")
}

/// Name of a committed part at the top of the output directory.
#[must_use]
pub fn committed_file_name(ordinal: u32, extension: &str) -> String {
    format!("{ordinal}{extension}")
}

/// Parse the ordinal out of a committed part name such as `7` or `7.gz`.
#[must_use]
pub fn parse_committed_ordinal(name: &str) -> Option<u32> {
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|&o| o > 0)
}

/// `<out>/_temporary`.
#[must_use]
pub fn temp_root(output_dir: &Path) -> PathBuf {
    output_dir.join(TEMP_DIR)
}

/// `<out>/_temporary/<app_attempt>`.
#[must_use]
pub fn job_attempt_path(output_dir: &Path, app_attempt: u32) -> PathBuf {
    temp_root(output_dir).join(app_attempt.to_string())
}

/// Committed parts of `output_dir`, ordered by task ordinal.
///
/// Hidden entries (`_SUCCESS`, `_temporary`) and anything not named after an
/// ordinal are skipped. A missing directory yields no parts.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn committed_parts(fs: &dyn FileSystem, output_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !fs.is_dir(output_dir)? {
        return Ok(Vec::new());
    }
    let mut parts: Vec<(u32, PathBuf)> = fs
        .list(output_dir)
        .with_context(|| format!("list {}", output_dir.display()))?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .filter_map(|entry| {
            let ordinal = parse_committed_ordinal(entry.file_name()?)?;
            Some((ordinal, entry.path))
        })
        .collect();
    parts.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(parts)
}

/// Whether job commit completed for `output_dir`.
///
/// # Errors
///
/// Returns an error if existence cannot be determined.
pub fn is_job_complete(fs: &dyn FileSystem, output_dir: &Path) -> Result<bool> {
    let marker = output_dir.join(SUCCESS_MARKER);
    fs.exists(&marker)
        .with_context(|| format!("stat {}", marker.display()))
}

/// Log what `dir` currently contains. Purely diagnostic; listing errors are
/// logged and swallowed.
pub fn log_directory(fs: &dyn FileSystem, dir: &Path) {
    match fs.is_dir(dir) {
        Ok(true) => match fs.list(dir) {
            Ok(entries) => {
                info!(dir = %dir.display(), entries = entries.len(), "output directory contains the following files");
                for entry in entries {
                    debug!(path = %entry.path.display(), is_dir = entry.is_dir, len = entry.len, "entry");
                }
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "could not list output directory"),
        },
        Ok(false) => match fs.exists(dir) {
            Ok(true) => info!(dir = %dir.display(), "output path is not a directory"),
            _ => info!(dir = %dir.display(), "output directory does not yet exist"),
        },
        Err(e) => debug!(dir = %dir.display(), error = %e, "could not stat output directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_and_committed_names_share_the_ordinal() {
        assert_eq!(staged_file_name(1, ""), "tmp-r-00001");
        assert_eq!(staged_file_name(123_456, ".gz"), "tmp-r-123456.gz");
        assert_eq!(committed_file_name(12, ""), "12");
        assert_eq!(parse_committed_ordinal("12.gz"), Some(12));
        assert_eq!(parse_committed_ordinal("_SUCCESS"), None);
        assert_eq!(parse_committed_ordinal("tmp-r-00001"), None);
        assert_eq!(parse_committed_ordinal("0"), None);
    }
}
