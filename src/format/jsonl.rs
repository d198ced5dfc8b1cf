//! JSON Lines output: one `{"key":…,"value":…}` object per record.

use super::{OutputFormat, RecordBound, RecordWriter, StagedPart, read_part};
use crate::context::TaskAttemptContext;
use crate::fs::FileSystem;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// On-disk shape of one JSONL record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

#[derive(Serialize)]
struct KeyValueRef<'a, K, V> {
    key: &'a K,
    value: &'a V,
}

/// JSON Lines format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLinesOutputFormat;

impl<K: RecordBound, V: RecordBound> OutputFormat<K, V> for JsonLinesOutputFormat {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn record_writer(
        &self,
        fs: Arc<dyn FileSystem>,
        ctx: &TaskAttemptContext,
    ) -> Result<Box<dyn RecordWriter<K, V>>> {
        Ok(Box::new(JsonLinesRecordWriter {
            part: StagedPart::for_task(fs, ctx)?,
            written: 0,
            _kv: PhantomData,
        }))
    }
}

struct JsonLinesRecordWriter<K, V> {
    part: StagedPart,
    written: u64,
    _kv: PhantomData<fn(&K, &V)>,
}

impl<K: RecordBound, V: RecordBound> RecordWriter<K, V> for JsonLinesRecordWriter<K, V> {
    fn write(&mut self, key: &K, value: &V) -> Result<()> {
        // Encode first so a failing value never leaves half a line behind.
        let mut line = serde_json::to_vec(&KeyValueRef { key, value })
            .with_context(|| format!("serialize record #{} for {}", self.written, self.part.path().display()))?;
        line.push(b'\n');
        self.part
            .write_all(&line)
            .with_context(|| format!("write {}", self.part.path().display()))?;
        self.written += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.part.finish()
    }
}

/// Read a JSONL part file back into `(key, value)` pairs.
///
/// Empty/whitespace-only lines are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any line fails to parse,
/// with the line number in the context.
pub fn read_jsonl_part<K: DeserializeOwned, V: DeserializeOwned>(
    fs: &dyn FileSystem,
    path: impl AsRef<Path>,
) -> Result<Vec<(K, V)>> {
    let path = path.as_ref();
    let rdr = BufReader::new(read_part(fs, path)?);
    let mut out = Vec::new();
    for (i, line) in rdr.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let kv: KeyValue<K, V> = serde_json::from_str(&line).with_context(|| {
            format!("parse JSONL line {} in {}: {}", i + 1, path.display(), line)
        })?;
        out.push((kv.key, kv.value));
    }
    Ok(out)
}
