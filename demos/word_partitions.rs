//! Word count written through the committing sink.
//!
//! Demonstrates:
//! - Hash-partitioning keyed records into tasks
//! - Parallel task commit followed by one job commit
//! - Gzip-compressed JSON Lines parts and reading them back
//! - Shipping a sink to a worker as a descriptor
//!
//! Run with: RUST_LOG=stagecommit=debug cargo run --example word_partitions

use anyhow::Result;
use stagecommit::format::read_jsonl_part;
use stagecommit::layout::committed_parts;
use stagecommit::testing::{TempDirPath, word_count_data};
use stagecommit::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let tmp = TempDirPath::new()?;
    let out = tmp.file_path("word-counts");

    let mut counts = BTreeMap::<String, u64>::new();
    for line in word_count_data() {
        for word in line.split_whitespace() {
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }

    let conf = Configuration::for_output_dir(&out).with(config::OUTPUT_COMPRESSION, "gzip");
    let registry = FormatRegistry::standard();
    let driver_sink = CommittingSink::<String, u64>::from_registry("jsonl", &registry, conf, Arc::new(LocalFileSystem))?;

    // What a driver would send to its workers.
    let wire = driver_sink.descriptor().to_bytes()?;
    println!("descriptor: {} bytes", wire.len());
    let sink = CommittingSink::from_descriptor(&SinkDescriptor::from_bytes(&wire)?, &registry, Arc::new(LocalFileSystem))?;

    let partitions = runner::hash_partition(counts, 3);
    let summary = SinkRunner::parallel(Some(3)).run(&sink, partitions)?;
    println!("wrote {} records in {} tasks", summary.records(), summary.tasks.len());

    let fs = LocalFileSystem;
    for (ordinal, path) in committed_parts(&fs, &out)? {
        let records: Vec<(String, u64)> = read_jsonl_part(&fs, &path)?;
        println!("part {ordinal} ({}): {records:?}", path.display());
    }
    println!("_SUCCESS present: {}", layout::is_job_complete(&fs, &out)?);

    Ok(())
}
