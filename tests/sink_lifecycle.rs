use anyhow::Result;
use stagecommit::config::{MARK_SUCCESS, OUTPUT_LAZY, TEXT_SEPARATOR};
use stagecommit::format::read_text_part;
use stagecommit::layout::{committed_parts, is_job_complete};
use stagecommit::testing::*;
use stagecommit::*;
use std::fs;

#[test]
fn closed_task_leaves_exactly_its_records_under_its_ordinal() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let out = tmp.file_path("out");
    let sink = local_sink::<String, u64>("text", &out)?;

    let mut task = sink.open(2, 3)?;
    assert_eq!(task.state(), TaskState::Opened);
    for (word, n) in [("alpha", 1), ("beta", 2), ("gamma", 3)] {
        task.write_record(&word.to_string(), &n)?;
    }
    assert_eq!(task.state(), TaskState::Writing);
    let commit = task.close()?;

    assert_eq!(commit.task_index, 2);
    assert_eq!(commit.records, 3);
    assert_eq!(
        commit.outcome,
        TaskOutcome::Committed {
            path: out.join("3")
        }
    );
    assert_eq!(fs::read_to_string(out.join("3"))?, "alpha\t1\nbeta\t2\ngamma\t3\n");
    assert!(!out.join("tmp-r-00003").exists());
    assert!(
        !out.join("_temporary/0/_temporary/attempt__0000_r_000003_0").exists(),
        "attempt work path must be gone after close"
    );
    Ok(())
}

#[test]
fn staging_is_invisible_until_the_task_commits() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let out = tmp.file_path("out");
    let sink = local_sink::<String, u64>("text", &out)?;

    let mut task = sink.open(0, 1)?;
    task.write_record(&"k".to_string(), &1)?;
    let fs = LocalFileSystem;
    assert!(committed_parts(&fs, &out)?.is_empty());
    assert!(
        out.join("_temporary/0/_temporary/attempt__0000_r_000001_0/tmp-r-00001")
            .exists()
    );

    task.close()?;
    assert_parts(&fs, &out, &[1]);
    Ok(())
}

#[test]
fn finalize_marks_success_and_removes_staging() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let out = tmp.file_path("out");
    let sink = local_sink::<String, u64>("text", &out)?;

    for i in 0..3 {
        let mut task = sink.open(i, 3)?;
        task.write_record(&format!("key{i}"), &(i as u64))?;
        task.close()?;
    }
    assert!(!is_job_complete(&LocalFileSystem, &out)?);

    sink.finalize_global(3)?;
    assert!(sink.is_finalized());
    assert_job_committed(&LocalFileSystem, &out);
    assert_parts(&LocalFileSystem, &out, &[1, 2, 3]);
    assert_eq!(read_text_part(&LocalFileSystem, out.join("2"))?, vec!["key1\t1"]);
    Ok(())
}

#[test]
fn second_finalize_is_refused() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    sink.open(0, 1)?.close()?;
    sink.finalize_global(1)?;

    let before = fs.file_paths();
    assert!(matches!(sink.finalize_global(1), Err(SinkError::AlreadyFinalized)));
    assert_eq!(fs.file_paths(), before);
    Ok(())
}

#[test]
fn empty_task_commits_an_empty_part() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    let commit = sink.open(0, 1)?.close()?;
    assert_eq!(commit.records, 0);
    assert_eq!(
        commit.outcome,
        TaskOutcome::Committed {
            path: "out/1".into()
        }
    );
    assert_eq!(fs.contents("out/1"), Some(Vec::new()));
    Ok(())
}

#[test]
fn lazy_empty_task_closes_without_a_file() -> Result<()> {
    let conf = Configuration::for_output_dir("out").with(OUTPUT_LAZY, true);
    let (fs, sink) = memory_sink_with::<String, u64>("text", conf)?;

    let commit = sink.open(0, 2)?.close()?;
    assert_eq!(commit.outcome, TaskOutcome::NothingToCommit);

    let mut task = sink.open(1, 2)?;
    task.write_record(&"only".to_string(), &1)?;
    task.close()?;

    sink.finalize_global(2)?;
    assert_parts(&fs, "out", &[2]);
    assert_job_committed(&fs, "out");
    Ok(())
}

#[test]
fn mark_success_can_be_disabled() -> Result<()> {
    let conf = Configuration::for_output_dir("out").with(MARK_SUCCESS, false);
    let (fs, sink) = memory_sink_with::<String, u64>("text", conf)?;
    sink.open(0, 1)?.close()?;
    sink.finalize_global(1)?;
    assert_job_not_committed(&fs, "out");
    assert_no_staging(&fs, "out");
    Ok(())
}

#[test]
fn configure_merges_engine_parameters_over_the_sink_conf() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    let sink = sink.configure(&Configuration::new().with(TEXT_SEPARATOR, "="))?;
    assert_eq!(sink.configuration().get(TEXT_SEPARATOR), Some("="));

    let mut task = sink.open(0, 1)?;
    task.write_record(&"a".to_string(), &1)?;
    task.close()?;
    assert_eq!(fs.contents("out/1"), Some(b"a=1\n".to_vec()));
    Ok(())
}

#[test]
fn reopening_a_task_replaces_the_earlier_output() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;

    let mut first = sink.open(0, 1)?;
    first.write_record(&"old".to_string(), &1)?;
    first.close()?;

    let mut second = sink.open(0, 1)?;
    second.write_record(&"new".to_string(), &2)?;
    second.close()?;

    assert_eq!(fs.contents("out/1"), Some(b"new\t2\n".to_vec()));
    Ok(())
}

#[test]
fn aborted_task_leaves_nothing_behind() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
    let mut task = sink.open(0, 2)?;
    task.write_record(&"gone".to_string(), &1)?;
    task.abort()?;

    let mut kept = sink.open(1, 2)?;
    kept.write_record(&"kept".to_string(), &1)?;
    kept.close()?;

    sink.finalize_global(2)?;
    assert_parts(&fs, "out", &[2]);
    assert_job_committed(&fs, "out");
    Ok(())
}

#[test]
fn missing_output_dir_is_a_config_error() {
    let err = local_sink_with::<String, u64>("text", Configuration::new()).unwrap_err();
    assert!(matches!(err, SinkError::Config { .. }));
}
