//! Output formats: the record-writing side of the sink.
//!
//! An [`OutputFormat`] hands each task attempt a [`RecordWriter`] that writes
//! into the attempt's work path. Formats never decide where committed output
//! ends up; they only stage `tmp-r-<ordinal>` inside the work path and the
//! committer takes it from there.
//!
//! Formats are looked up by name through a [`FormatRegistry`], which is also
//! how a [`SinkDescriptor`](crate::descriptor::SinkDescriptor) is turned back
//! into a working sink on a worker.
//!
//! ## Built-in formats
//! - `text` - `key<TAB>value` lines ([`TextOutputFormat`])
//! - `jsonl` - `{"key":..,"value":..}` lines ([`JsonLinesOutputFormat`])
//! - `csv` - `key,value` rows ([`CsvOutputFormat`], feature `io-csv`)

#[cfg_attr(docsrs, doc(cfg(feature = "io-csv")))]
#[cfg(feature = "io-csv")]
pub mod csv;
pub mod jsonl;
pub mod text;

#[cfg(feature = "io-csv")]
pub use self::csv::{CsvOutputFormat, read_csv_part};
pub use jsonl::{JsonLinesOutputFormat, KeyValue, read_jsonl_part};
pub use text::{TextOutputFormat, read_text_part};

use crate::compression::{EncodedWrite, encoded_writer, extension_for};
use crate::config::{Configuration, OUTPUT_COMPRESSION, OUTPUT_LAZY};
use crate::context::TaskAttemptContext;
use crate::error::{Result as SinkResult, SinkError};
use crate::fs::FileSystem;
use crate::layout::staged_file_name;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bound shared by record keys and values.
pub trait RecordBound: Serialize + Send + Sync + 'static {}
impl<T: Serialize + Send + Sync + 'static> RecordBound for T {}

/// Writes the records of one task attempt.
pub trait RecordWriter<K, V>: Send {
    /// Append one record to the staged output.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    fn write(&mut self, key: &K, value: &V) -> Result<()>;

    /// Flush and close the staged output.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered bytes or the codec trailer cannot be written.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Produces record writers bound to a task attempt's work path.
pub trait OutputFormat<K, V>: Send + Sync {
    /// Human-readable format name used in logs.
    fn name(&self) -> &str;

    /// Create the record writer for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged file cannot be created or the format's
    /// configuration is invalid.
    fn record_writer(
        &self,
        fs: Arc<dyn FileSystem>,
        ctx: &TaskAttemptContext,
    ) -> Result<Box<dyn RecordWriter<K, V>>>;
}

/// Constructor stored in a [`FormatRegistry`].
pub type FormatFactory<K, V> =
    Arc<dyn Fn(&Configuration) -> Result<Arc<dyn OutputFormat<K, V>>> + Send + Sync>;

/// Explicit name → constructor table for output formats.
pub struct FormatRegistry<K, V> {
    factories: BTreeMap<String, FormatFactory<K, V>>,
}

impl<K, V> FormatRegistry<K, V> {
    /// Registry without any formats.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Configuration) -> Result<Arc<dyn OutputFormat<K, V>>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Build the format registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::UnknownFormat`] if nothing is registered under
    /// `name`, or [`SinkError::Instantiation`] if the constructor fails.
    pub fn create(&self, name: &str, conf: &Configuration) -> SinkResult<Arc<dyn OutputFormat<K, V>>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SinkError::UnknownFormat(name.to_string()))?;
        factory(conf).map_err(|e| SinkError::instantiation(format!("output format `{name}`"), e))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl<K: RecordBound, V: RecordBound> FormatRegistry<K, V> {
    /// Registry with every built-in format.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register("text", |_| Ok(Arc::new(TextOutputFormat) as Arc<dyn OutputFormat<K, V>>))
            .register("jsonl", |_| Ok(Arc::new(JsonLinesOutputFormat) as Arc<dyn OutputFormat<K, V>>));
        #[cfg(feature = "io-csv")]
        registry.register("csv", |_| Ok(Arc::new(CsvOutputFormat) as Arc<dyn OutputFormat<K, V>>));
        registry
    }
}

impl<K: RecordBound, V: RecordBound> Default for FormatRegistry<K, V> {
    fn default() -> Self {
        Self::standard()
    }
}

/// The staged part file of one attempt.
///
/// Created eagerly unless [`OUTPUT_LAZY`] is set, in which case the file only
/// appears on the first write. Implements [`Write`] so formats can layer their
/// encoders on top.
pub struct StagedPart {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    codec: Option<String>,
    out: Option<Box<dyn EncodedWrite>>,
}

impl StagedPart {
    /// Prepare the staged part for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or, for eager parts,
    /// the file cannot be created.
    pub fn for_task(fs: Arc<dyn FileSystem>, ctx: &TaskAttemptContext) -> Result<Self> {
        let conf = ctx.configuration();
        let codec = conf.get(OUTPUT_COMPRESSION).map(str::to_string);
        let extension = extension_for(codec.as_deref())?;
        let lazy = conf.get_bool(OUTPUT_LAZY, false)?;
        let path = ctx
            .work_path()
            .join(staged_file_name(ctx.partition(), &extension));
        let mut part = Self {
            fs,
            path,
            codec,
            out: None,
        };
        if !lazy {
            part.open()?;
        }
        Ok(part)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been created.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.out.is_some()
    }

    fn open(&mut self) -> Result<&mut Box<dyn EncodedWrite>> {
        if self.out.is_none() {
            let raw = self
                .fs
                .create(&self.path)
                .with_context(|| format!("create {}", self.path.display()))?;
            let out = encoded_writer(raw, self.codec.as_deref())
                .with_context(|| format!("setup compression for {}", self.path.display()))?;
            self.out = Some(out);
        }
        self.out
            .as_mut()
            .context("staged part writer missing after open")
    }

    /// Finish the codec stream and flush, if the file was ever created.
    ///
    /// # Errors
    ///
    /// Returns an error if the final bytes cannot be written.
    pub fn finish(self) -> Result<()> {
        if let Some(out) = self.out {
            out.finish()
                .with_context(|| format!("finish {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Write for StagedPart {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open().map_err(io::Error::other)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.out.as_mut() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}

/// Read a whole part file. Committed parts carry their codec extension, so
/// only the extension selects decompression.
pub(crate) fn read_part(fs: &dyn FileSystem, path: &Path) -> Result<Box<dyn io::Read + Send>> {
    let raw = fs
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    crate::compression::reader_for_extension(raw, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}
