use anyhow::Result;
use stagecommit::format::{read_jsonl_part, read_text_part};
use stagecommit::testing::*;
use stagecommit::*;
use std::collections::BTreeMap;
use std::thread;

#[test]
fn two_tasks_on_one_directory_both_commit() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let out = tmp.file_path("out");
    let sink = local_sink::<String, u64>("text", &out)?;

    thread::scope(|s| -> Result<()> {
        let handles: Vec<_> = (0..2)
            .map(|task| {
                let sink = &sink;
                s.spawn(move || -> Result<TaskCommit> {
                    let mut w = sink.open(task, 2)?;
                    for n in 0..100u64 {
                        w.write_record(&format!("t{task}"), &n)?;
                    }
                    Ok(w.close()?)
                })
            })
            .collect();
        for h in handles {
            h.join().expect("task thread panicked")?;
        }
        Ok(())
    })?;

    for (ordinal, task) in [(1, 0), (2, 1)] {
        let lines = read_text_part(&LocalFileSystem, out.join(ordinal.to_string()))?;
        let expected: Vec<String> = (0..100).map(|n| format!("t{task}\t{n}")).collect();
        assert_eq!(lines, expected);
    }
    Ok(())
}

#[test]
fn coordinator_finalizes_after_threads_report() -> Result<()> {
    let (fs, sink) = memory_sink::<u64, u64>("jsonl", "out")?;
    let coord = JobCoordinator::new(4);

    thread::scope(|s| {
        for task in 0..4 {
            let (sink, coord) = (&sink, &coord);
            s.spawn(move || {
                let result = sink.open(task, 4).and_then(|mut w| {
                    w.write_record(&(task as u64), &1)?;
                    w.close()
                });
                match result {
                    Ok(commit) => coord.task_committed(&commit),
                    Err(e) => coord.task_failed(task, &e),
                }
            });
        }
    });

    let commits = coord.finalize(&sink)?;
    assert_eq!(commits.len(), 4);
    assert_job_committed(&fs, "out");
    assert_parts(&fs, "out", &[1, 2, 3, 4]);
    Ok(())
}

#[test]
fn parallel_runner_matches_sequential_runner() -> Result<()> {
    let partitions = numbered_partitions(8, 25);

    let (seq_fs, seq_sink) = memory_sink::<u64, u64>("jsonl", "out")?;
    let seq = SinkRunner::sequential().run(&seq_sink, partitions.clone())?;

    let (par_fs, par_sink) = memory_sink::<u64, u64>("jsonl", "out")?;
    let par = SinkRunner::parallel(Some(4)).run(&par_sink, partitions.clone())?;

    assert_eq!(seq, par);
    assert_eq!(par.records(), 200);
    assert_eq!(seq_fs.file_paths(), par_fs.file_paths());

    for (i, expected) in partitions.iter().enumerate() {
        let path = format!("out/{}", i + 1);
        let back: Vec<(u64, u64)> = read_jsonl_part(&par_fs, &path)?;
        assert_eq!(&back, expected);
    }
    Ok(())
}

#[test]
fn word_count_job_round_trips() -> Result<()> {
    let (fs, sink) = memory_sink::<String, u64>("jsonl", "out")?;
    let summary = SinkRunner::default().run(&sink, word_count_partitions(3))?;
    assert_eq!(summary.tasks.len(), 3);

    let mut back = BTreeMap::new();
    for path in summary.committed_paths() {
        back.extend(read_jsonl_part::<String, u64>(&fs, path)?);
    }
    assert_eq!(back.into_iter().collect::<Vec<_>>(), word_counts());
    Ok(())
}

#[test]
fn skewed_hot_key_lands_in_a_single_part() -> Result<()> {
    let (fs, sink) = memory_sink::<String, i32>("jsonl", "out")?;
    let partitions = runner::hash_partition(skewed_key_value_data(), 4);
    let summary = SinkRunner::parallel(Some(4)).run(&sink, partitions)?;
    assert_eq!(summary.records(), 100);
    assert_job_committed(&fs, "out");

    let mut holders = Vec::new();
    for path in summary.committed_paths() {
        let back: Vec<(String, i32)> = read_jsonl_part(&fs, path)?;
        let hot: Vec<i32> = back
            .iter()
            .filter(|(k, _)| k == "hot_key")
            .map(|(_, v)| *v)
            .collect();
        if !hot.is_empty() {
            holders.push((path.clone(), hot));
        }
    }
    assert_eq!(holders.len(), 1, "hot_key spread over {holders:?}");
    assert_eq!(holders[0].1, (0..50).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn sink_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}
    assert_send_sync::<CommittingSink<String, u64>>();
    assert_send_sync::<JobCoordinator>();
    assert_send::<TaskWriter<String, u64>>();
}
