use anyhow::Result;
use stagecommit::config::{OUTPUT_COMPRESSION, TEXT_SEPARATOR};
use stagecommit::testing::*;
use stagecommit::*;
use std::sync::Arc;

#[test]
fn descriptor_rebuilds_an_equivalent_sink() -> Result<()> {
    let conf = Configuration::for_output_dir("out").with(TEXT_SEPARATOR, "|");
    let (fs, sink) = memory_sink_with::<String, u64>("text", conf)?;

    let bytes = sink.descriptor().to_bytes()?;
    let rebuilt = CommittingSink::<String, u64>::from_descriptor(
        &SinkDescriptor::from_bytes(&bytes)?,
        &FormatRegistry::standard(),
        Arc::new(fs.clone()),
    )?;
    assert_eq!(rebuilt.format_name(), "text");
    assert_eq!(rebuilt.configuration(), sink.configuration());
    assert_eq!(rebuilt.descriptor(), sink.descriptor());

    let mut task = rebuilt.open(0, 1)?;
    task.write_record(&"k".to_string(), &7)?;
    task.close()?;
    rebuilt.finalize_global(1)?;

    assert_eq!(fs.contents("out/1"), Some(b"k|7\n".to_vec()));
    Ok(())
}

#[test]
fn corrupted_descriptor_is_rejected() -> Result<()> {
    let descriptor = SinkDescriptor::new(
        "jsonl",
        Configuration::for_output_dir("/data/out").with(OUTPUT_COMPRESSION, "gzip"),
    );
    let mut bytes = descriptor.to_bytes()?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let err = SinkDescriptor::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, SinkError::Descriptor(_)));
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("checksum"));
    Ok(())
}

#[test]
fn unknown_format_in_descriptor_is_reported() {
    let descriptor = SinkDescriptor::new("parquet", Configuration::for_output_dir("out"));
    let err = CommittingSink::<String, u64>::from_descriptor(
        &descriptor,
        &FormatRegistry::standard(),
        Arc::new(MemoryFileSystem::new()),
    )
    .unwrap_err();
    assert!(matches!(err, SinkError::UnknownFormat(name) if name == "parquet"));
}

#[test]
fn custom_formats_travel_by_name() -> Result<()> {
    let mut registry = FormatRegistry::<String, u64>::empty();
    registry.register("upper-text", |_| {
        Ok(Arc::new(format::TextOutputFormat) as Arc<dyn OutputFormat<String, u64>>)
    });
    let descriptor = SinkDescriptor::new("upper-text", Configuration::for_output_dir("out"));
    let bytes = descriptor.to_bytes()?;

    let sink = CommittingSink::from_descriptor(
        &SinkDescriptor::from_bytes(&bytes)?,
        &registry,
        Arc::new(MemoryFileSystem::new()),
    )?;
    assert_eq!(sink.format_name(), "upper-text");
    assert!(!FormatRegistry::<String, u64>::standard().contains("upper-text"));
    Ok(())
}
