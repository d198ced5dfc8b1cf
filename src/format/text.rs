//! Plain text output: one `key<sep>value` line per record.

use super::{OutputFormat, RecordBound, RecordWriter, StagedPart, read_part};
use crate::config::TEXT_SEPARATOR;
use crate::context::TaskAttemptContext;
use crate::fs::FileSystem;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Text format; separator from [`TEXT_SEPARATOR`], TAB by default.
///
/// Strings are written as-is, other values as compact JSON. A key or value
/// that serializes to `null` is left out together with the separator; a record
/// where both are `null` produces no line at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextOutputFormat;

impl<K: RecordBound, V: RecordBound> OutputFormat<K, V> for TextOutputFormat {
    fn name(&self) -> &str {
        "text"
    }

    fn record_writer(
        &self,
        fs: Arc<dyn FileSystem>,
        ctx: &TaskAttemptContext,
    ) -> Result<Box<dyn RecordWriter<K, V>>> {
        let separator = ctx.configuration().get_or(TEXT_SEPARATOR, "\t").to_string();
        let part = StagedPart::for_task(fs, ctx)?;
        Ok(Box::new(TextRecordWriter {
            part,
            separator,
            _kv: PhantomData,
        }))
    }
}

struct TextRecordWriter<K, V> {
    part: StagedPart,
    separator: String,
    _kv: PhantomData<fn(&K, &V)>,
}

fn render<T: Serialize>(v: &T) -> Result<Option<String>> {
    Ok(match serde_json::to_value(v)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl<K: RecordBound, V: RecordBound> RecordWriter<K, V> for TextRecordWriter<K, V> {
    fn write(&mut self, key: &K, value: &V) -> Result<()> {
        let line = match (render(key)?, render(value)?) {
            (Some(k), Some(v)) => format!("{k}{}{v}\n", self.separator),
            (Some(k), None) => format!("{k}\n"),
            (None, Some(v)) => format!("{v}\n"),
            (None, None) => return Ok(()),
        };
        self.part
            .write_all(line.as_bytes())
            .with_context(|| format!("write {}", self.part.path().display()))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.part.finish()
    }
}

/// Read the lines of a text part file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, decompressed or read.
pub fn read_text_part(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let rdr = BufReader::new(read_part(fs, path)?);
    rdr.lines()
        .enumerate()
        .map(|(i, line)| line.with_context(|| format!("read line {} in {}", i + 1, path.display())))
        .collect()
}
