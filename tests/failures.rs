mod common;

use std::fs;
use std::io::Write;

use anyhow::Result;
use tempfile::tempdir;

use parzip::io::sink::partial_path;
use parzip::{
    ArchiveAssembler, CollectorConfig, DuplicatePolicy, Error, InputFile, OutputFile, collect,
};

use common::read_members;

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn unreadable_input_is_reported_alone() -> Result<()> {
    let temp = tempdir()?;
    let one = temp.path().join("one.txt");
    let two = temp.path().join("two.txt");
    let missing = temp.path().join("missing.txt");
    fs::write(&one, "1")?;
    fs::write(&two, "2")?;

    let inputs = vec![
        InputFile::plain(&one, "one.txt"),
        InputFile::plain(&missing, "missing.txt"),
        InputFile::plain(&two, "two.txt"),
    ];
    let outcome = collect(inputs, &CollectorConfig::default()).await;

    assert!(!outcome.is_complete());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].path, missing);
    assert!(matches!(outcome.failures[0].error, Error::SourceRead { .. }));
    assert!(outcome.table.contains("one.txt"));
    assert!(outcome.table.contains("two.txt"));
    assert_eq!(outcome.table.len(), 2);

    match outcome.into_result() {
        Err(Error::BatchFailed(failures)) => assert_eq!(failures.len(), 1),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("batch with a failed input must be rejected"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_paths_keep_exactly_one_candidate() -> Result<()> {
    let temp = tempdir()?;
    let left = temp.path().join("left.txt");
    let right = temp.path().join("right.txt");
    fs::write(&left, "from left")?;
    fs::write(&right, "from right")?;

    let inputs = vec![
        InputFile::plain(&left, "same/name.txt"),
        InputFile::plain(&right, "same/name.txt"),
    ];
    let table = collect(inputs, &CollectorConfig::default())
        .await
        .into_result()?;
    assert_eq!(table.duplicates(), ["same/name.txt"]);

    let members = read_members(ArchiveAssembler::new(table)?.to_bytes()?).await?;
    assert_eq!(members.len(), 1);
    let contents = members[0].contents()?;
    assert!(contents == b"from left" || contents == b"from right");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_listed_policy_is_deterministic() -> Result<()> {
    let temp = tempdir()?;
    let mut inputs = Vec::new();
    for i in 0..8 {
        let path = temp.path().join(format!("candidate{i}.txt"));
        fs::write(&path, format!("candidate {i}"))?;
        inputs.push(InputFile::plain(path, "winner.txt"));
    }
    let config = CollectorConfig {
        duplicate_policy: DuplicatePolicy::FirstListed,
        ..CollectorConfig::default()
    };

    for _ in 0..3 {
        let table = collect(inputs.clone(), &config).await.into_result()?;
        let members = read_members(ArchiveAssembler::new(table)?.to_bytes()?).await?;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].contents()?, b"candidate 0");
    }
    Ok(())
}

#[tokio::test]
async fn empty_batch_produces_empty_archive() -> Result<()> {
    let table = collect(Vec::new(), &CollectorConfig::default())
        .await
        .into_result()?;
    assert!(table.is_empty());
    let members = read_members(ArchiveAssembler::new(table)?.to_bytes()?).await?;
    assert!(members.is_empty());
    Ok(())
}

/// Forwards to the sink until its byte budget runs out, then fails like a full disk.
struct FailAfter<'a> {
    inner: &'a mut OutputFile,
    budget: usize,
}

impl Write for FailAfter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.len() > self.budget {
            return Err(std::io::Error::other("no space left on device"));
        }
        self.budget -= buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[tokio::test]
async fn failed_write_leaves_previous_archive() -> Result<()> {
    let temp = tempdir()?;
    let target = temp.path().join("out.zip");
    fs::write(&target, "previous archive")?;

    let source = temp.path().join("a.txt");
    fs::write(&source, "a".repeat(1000))?;
    let table = collect(vec![InputFile::plain(&source, "a.txt")], &CollectorConfig::default())
        .await
        .into_result()?;
    let assembler = ArchiveAssembler::new(table)?;

    let mut sink = OutputFile::create(&target)?;
    assert!(partial_path(&target).exists());
    let err = assembler
        .write_to(FailAfter {
            inner: &mut sink,
            budget: 40,
        })
        .map_err(|err| sink.wrap_error(err))
        .unwrap_err();
    assert!(matches!(err, Error::OutputWrite { .. }), "{err}");
    drop(sink);

    assert_eq!(fs::read(&target)?, b"previous archive");
    assert!(!partial_path(&target).exists());
    Ok(())
}
