use anyhow::Result;
use serde::ser::{Error as _, Serialize, Serializer};
use stagecommit::fs::FsOp;
use stagecommit::testing::*;
use stagecommit::*;

/// Value whose serialization always fails.
struct Poison;

impl Serialize for Poison {
    fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("poisoned value"))
    }
}

#[test]
fn staged_file_creation_failure_is_an_instantiation_error() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    fs.fail_on(FsOp::Create, "tmp-r-00001");
    let err = sink.open(0, 1).unwrap_err();
    assert!(matches!(err, SinkError::Instantiation { .. }));
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("injected Create fault"));
    Ok(())
}

#[test]
fn job_setup_failure_is_an_instantiation_error() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    fs.fail_on(FsOp::CreateDir, "_temporary");
    assert!(matches!(sink.open(0, 1), Err(SinkError::Instantiation { .. })));
    Ok(())
}

#[test]
fn unknown_codec_fails_at_open() -> Result<()> {
    let conf = Configuration::for_output_dir("out").with(config::OUTPUT_COMPRESSION, "lz4");
    let (_fs, sink) = memory_sink_with::<String, u64>("text", conf)?;
    assert!(matches!(sink.open(0, 1), Err(SinkError::Instantiation { .. })));
    Ok(())
}

#[test]
fn failed_write_poisons_the_task() -> Result<()> {
    let (fs, sink) = memory_sink::<String, Poison>("jsonl", "out")?;
    let mut task = sink.open(0, 1)?;

    let err = task.write_record(&"k".to_string(), &Poison).unwrap_err();
    assert!(matches!(&err, SinkError::WriteFailed { attempt, .. } if attempt.ordinal() == 1));
    assert_eq!(task.state(), TaskState::Failed);

    assert!(matches!(
        task.write_record(&"k".to_string(), &Poison),
        Err(SinkError::WriteFailed { .. })
    ));
    assert!(matches!(task.close(), Err(SinkError::CommitFailed { .. })));
    assert_parts(&fs, "out", &[]);
    Ok(())
}

#[test]
fn io_failure_during_close_is_a_commit_error() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    fs.fail_on(FsOp::Write, "tmp-r-00001");

    let mut task = sink.open(0, 1)?;
    task.write_record(&"buffered".to_string(), &1)?;
    assert!(matches!(task.close(), Err(SinkError::CommitFailed { .. })));
    Ok(())
}

#[test]
fn rename_failure_is_a_commit_error() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    fs.fail_on(FsOp::Rename, "tmp-r-00001");

    let task = sink.open(0, 1)?;
    let err = task.close().unwrap_err();
    assert!(matches!(err, SinkError::CommitFailed { .. }));
    assert!(!err.is_job_level());
    assert_parts(&fs, "out", &[]);
    Ok(())
}

#[test]
fn job_commit_failure_is_reported_once() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    sink.open(0, 1)?.close()?;
    fs.fail_on(FsOp::Create, "_SUCCESS");

    let err = sink.finalize_global(1).unwrap_err();
    assert!(matches!(err, SinkError::JobCommitFailed { .. }));
    assert!(err.is_job_level());
    assert_parts(&fs, "out", &[1]);

    fs.clear_faults();
    assert!(matches!(sink.finalize_global(1), Err(SinkError::AlreadyFinalized)));
    assert_job_not_committed(&fs, "out");
    Ok(())
}

#[test]
fn runner_abandons_the_job_when_a_task_fails() -> Result<()> {
    let (fs, sink) = memory_sink::<u64, u64>("jsonl", "out")?;
    fs.fail_on(FsOp::Rename, "tmp-r-00002");

    let err = SinkRunner::sequential()
        .run(&sink, numbered_partitions(3, 5))
        .unwrap_err();
    match err {
        SinkError::TasksFailed { failed } => assert_eq!(failed, vec![1]),
        other => panic!("expected TasksFailed, got {other:?}"),
    }

    assert_job_not_committed(&fs, "out");
    assert_no_staging(&fs, "out");
    assert_parts(&fs, "out", &[1, 3]);
    assert!(sink.is_finalized());
    Ok(())
}

#[test]
fn parallel_runner_reports_every_failed_task() -> Result<()> {
    let (fs, sink) = memory_sink::<u64, u64>("jsonl", "out")?;
    fs.fail_on(FsOp::Create, "tmp-r-00003");
    fs.fail_on(FsOp::Create, "tmp-r-00005");

    match SinkRunner::parallel(Some(2)).run(&sink, numbered_partitions(6, 2)) {
        Err(SinkError::TasksFailed { failed }) => assert_eq!(failed, vec![2, 4]),
        other => panic!("expected TasksFailed, got {other:?}"),
    }
    assert_job_not_committed(&fs, "out");
    Ok(())
}
