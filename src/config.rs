//! Immutable configuration snapshots.
//!
//! A [`Configuration`] is a flat string map, serialized verbatim inside a
//! [`SinkDescriptor`](crate::descriptor::SinkDescriptor). It is built once,
//! wrapped in an `Arc`, and never mutated afterwards; anything that differs per
//! task lives in [`TaskAttemptContext`](crate::context::TaskAttemptContext).

use crate::error::{Result, SinkError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory receiving the committed output. Required.
pub const OUTPUT_DIR: &str = "output.dir";
/// Name of a registered compression codec applied to every part file.
pub const OUTPUT_COMPRESSION: &str = "output.compression";
/// Create staged files on the first record instead of at open.
pub const OUTPUT_LAZY: &str = "output.lazy";
/// Separator between key and value for the `text` format.
pub const TEXT_SEPARATOR: &str = "text.separator";
/// Single-byte field delimiter for the `csv` format.
pub const CSV_DELIMITER: &str = "csv.delimiter";
/// Write a `_SUCCESS` marker on job commit.
pub const MARK_SUCCESS: &str = "committer.mark_success";
/// Job-level attempt number scoping `_temporary/<n>`.
pub const APP_ATTEMPT: &str = "committer.app_attempt";
/// Log output directory listings around open and close.
pub const LOG_LISTINGS: &str = "sink.log_listings";

/// Environment variable naming a JSON file of site defaults.
pub const SITE_CONF_ENV: &str = "STAGECOMMIT_CONF";

/// Immutable key/value configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration writing to `dir` with every other key at its default.
    #[must_use]
    pub fn for_output_dir(dir: impl AsRef<Path>) -> Self {
        Self::new().with(OUTPUT_DIR, dir.as_ref().to_string_lossy())
    }

    /// Return a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.entries.insert(key.into(), value.to_string());
        self
    }

    /// Return a copy where every entry of `other` overrides this one.
    #[must_use]
    pub fn merged(&self, other: &Configuration) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { entries }
    }

    /// Return a copy filled with defaults from the JSON file named by
    /// [`SITE_CONF_ENV`]. Keys that are already set win over site defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but the file cannot be read or
    /// is not a JSON object of strings.
    pub fn with_site_overlay(&self) -> Result<Self> {
        match std::env::var_os(SITE_CONF_ENV) {
            Some(path) => self.with_defaults_from(Path::new(&path)),
            None => Ok(self.clone()),
        }
    }

    /// Return a copy filled with defaults read from a JSON object file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn with_defaults_from(&self, path: &Path) -> Result<Self> {
        let site = read_site_file(path).map_err(|e| SinkError::config(SITE_CONF_ENV, format!("{e:#}")))?;
        let mut entries = self.entries.clone();
        for (k, v) in site {
            entries.entry(k).or_insert(v);
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse `key` as a boolean (`true`/`false`, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] for any other value.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(SinkError::config(key, format!("expected a boolean, got `{v}`"))),
        }
    }

    /// Parse `key` with [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the value does not parse.
    pub fn get_parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|e| SinkError::config(key, format!("cannot parse `{v}`: {e}"))),
        }
    }

    /// The configured output directory.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if [`OUTPUT_DIR`] is unset or empty.
    pub fn output_dir(&self) -> Result<PathBuf> {
        match self.get(OUTPUT_DIR) {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
            _ => Err(SinkError::config(OUTPUT_DIR, "output directory is not set")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn read_site_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let site: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse site configuration {}", path.display()))?;
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn typed_getters_fall_back_to_defaults() {
        let conf = Configuration::new().with(MARK_SUCCESS, "FALSE").with(APP_ATTEMPT, "3");
        assert!(!conf.get_bool(MARK_SUCCESS, true).unwrap());
        assert!(conf.get_bool(OUTPUT_LAZY, true).unwrap());
        assert_eq!(conf.get_parsed::<u32>(APP_ATTEMPT, 0).unwrap(), 3);
        assert_eq!(conf.get_or(TEXT_SEPARATOR, "\t"), "\t");
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let conf = Configuration::new().with(OUTPUT_LAZY, "sometimes");
        let err = conf.get_bool(OUTPUT_LAZY, false).unwrap_err();
        assert!(matches!(err, SinkError::Config { ref key, .. } if key == OUTPUT_LAZY));
        assert!(Configuration::new().output_dir().is_err());
    }

    #[test]
    fn merged_overrides_but_site_defaults_do_not() {
        let base = Configuration::new().with(TEXT_SEPARATOR, ",").with(OUTPUT_DIR, "/a");
        let merged = base.merged(&Configuration::new().with(OUTPUT_DIR, "/b"));
        assert_eq!(merged.get(OUTPUT_DIR), Some("/b"));
        assert_eq!(merged.get(TEXT_SEPARATOR), Some(","));

        let mut site = tempfile::NamedTempFile::new().unwrap();
        write!(site, r#"{{"output.dir": "/site", "output.lazy": "true"}}"#).unwrap();
        let filled = merged.with_defaults_from(site.path()).unwrap();
        assert_eq!(filled.get(OUTPUT_DIR), Some("/b"));
        assert_eq!(filled.get(OUTPUT_LAZY), Some("true"));
    }
}
