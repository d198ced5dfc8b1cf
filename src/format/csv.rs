//! CSV output: one `key,value` row per record, no header row.
//!
//! Keys and values must serialize to scalars (or flat tuples of scalars);
//! the delimiter comes from [`CSV_DELIMITER`].

use super::{OutputFormat, RecordBound, RecordWriter, StagedPart, read_part};
use crate::config::CSV_DELIMITER;
use crate::context::TaskAttemptContext;
use crate::fs::FileSystem;
use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// CSV format.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvOutputFormat;

fn delimiter(raw: &str) -> Result<u8> {
    match raw.as_bytes() {
        [b] => Ok(*b),
        _ => bail!("`{CSV_DELIMITER}` must be a single byte, got `{raw}`"),
    }
}

impl<K: RecordBound, V: RecordBound> OutputFormat<K, V> for CsvOutputFormat {
    fn name(&self) -> &str {
        "csv"
    }

    fn record_writer(
        &self,
        fs: Arc<dyn FileSystem>,
        ctx: &TaskAttemptContext,
    ) -> Result<Box<dyn RecordWriter<K, V>>> {
        let delim = delimiter(ctx.configuration().get_or(CSV_DELIMITER, ","))?;
        let part = StagedPart::for_task(fs, ctx)?;
        let inner = WriterBuilder::new()
            .has_headers(false)
            .delimiter(delim)
            .from_writer(part);
        Ok(Box::new(CsvRecordWriter {
            inner,
            _kv: PhantomData,
        }))
    }
}

struct CsvRecordWriter<K, V> {
    inner: csv::Writer<StagedPart>,
    _kv: PhantomData<fn(&K, &V)>,
}

impl<K: RecordBound, V: RecordBound> RecordWriter<K, V> for CsvRecordWriter<K, V> {
    fn write(&mut self, key: &K, value: &V) -> Result<()> {
        self.inner
            .serialize((key, value))
            .context("serialize CSV row")
    }

    fn close(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner;
        inner.flush().context("flush CSV rows")?;
        let part = inner
            .into_inner()
            .map_err(|e| anyhow::anyhow!("close CSV writer: {}", e.error()))?;
        part.finish()
    }
}

/// Read a CSV part file back into `(key, value)` pairs.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row fails to deserialize.
pub fn read_csv_part<K: DeserializeOwned, V: DeserializeOwned>(
    fs: &dyn FileSystem,
    path: impl AsRef<Path>,
    delimiter_byte: u8,
) -> Result<Vec<(K, V)>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter_byte)
        .from_reader(read_part(fs, path)?);
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize::<(K, V)>().enumerate() {
        out.push(row.with_context(|| format!("parse CSV row {} in {}", i + 1, path.display()))?);
    }
    Ok(out)
}
