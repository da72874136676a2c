mod common;

use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;

use parzip::zip::{CompressionMethod, DosDateTime};
use parzip::{
    ArchiveAssembler, CollectorConfig, EntryCompressor, Error, InputFile, RawEntry, collect,
    extract_nested_archive,
};

use common::{names, read_members};

/// Build a small archive from in-memory files, compressed with DEFLATE.
fn write_inner_archive(path: &Path, files: &[(&str, &[u8])]) -> Result<Vec<RawEntry>> {
    let compressor = EntryCompressor::default();
    let entries = files
        .iter()
        .map(|(name, body)| compressor.compress_bytes(name.to_string(), body, DosDateTime::MIN))
        .collect::<parzip::Result<Vec<_>>>()?;
    fs::write(path, ArchiveAssembler::from_entries(entries.clone())?.to_bytes()?)?;
    Ok(entries)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_members_pass_through_untouched() -> Result<()> {
    let temp = tempdir()?;
    let inner = temp.path().join("inner.zip");
    let body = b"repetitive payload ".repeat(50);
    let originals = write_inner_archive(
        &inner,
        &[("lib/m.txt", body.as_slice()), ("readme", &b"read me"[..])],
    )?;

    let plain = temp.path().join("note.txt");
    fs::write(&plain, "a note")?;

    let inputs = vec![
        InputFile::nested(&inner, "inner.zip"),
        InputFile::plain(&plain, "note.txt"),
    ];
    let table = collect(inputs, &CollectorConfig::default())
        .await
        .into_result()?;
    let archive = ArchiveAssembler::new(table)?.to_bytes()?;

    let members = read_members(archive).await?;
    assert_eq!(names(&members), ["lib/m.txt", "note.txt", "readme"]);

    let merged = &members[0];
    let original = originals
        .iter()
        .find(|e| e.archive_path() == "lib/m.txt")
        .expect("original member");
    assert_eq!(merged.record.compression_method, CompressionMethod::Deflate);
    assert_eq!(merged.compressed, original.compressed_bytes());
    assert_eq!(merged.record.crc32, original.crc32());
    assert_eq!(merged.contents()?, body);
    assert_eq!(members[2].contents()?, b"read me");
    Ok(())
}

#[tokio::test]
async fn extraction_copies_header_fields() -> Result<()> {
    let temp = tempdir()?;
    let inner = temp.path().join("inner.zip");
    let stored = RawEntry::new(
        "raw.bin".to_string(),
        CompressionMethod::Unknown(99),
        0x1234_5678,
        42,
        vec![7u8; 10],
        DosDateTime::from_parts(2020, 6, 15, 12, 30, 44),
    )?;
    fs::write(
        &inner,
        ArchiveAssembler::from_entries(vec![stored.clone()])?.to_bytes()?,
    )?;

    let extracted = extract_nested_archive(&inner).await?;
    assert_eq!(extracted, vec![stored]);
    Ok(())
}

#[tokio::test]
async fn malformed_archive_fails_alone() -> Result<()> {
    let temp = tempdir()?;
    let good = temp.path().join("good.zip");
    write_inner_archive(&good, &[("ok.txt", &b"fine"[..])])?;

    let truncated = temp.path().join("truncated.zip");
    let bytes = fs::read(&good)?;
    fs::write(&truncated, &bytes[..40])?;

    let not_zip = temp.path().join("fake.zip");
    fs::write(&not_zip, "this is plain text")?;

    let inputs = vec![
        InputFile::nested(&good, "good.zip"),
        InputFile::nested(&truncated, "truncated.zip"),
        InputFile::nested(&not_zip, "fake.zip"),
    ];
    let outcome = collect(inputs, &CollectorConfig::default()).await;

    assert_eq!(outcome.failures.len(), 2);
    for failure in &outcome.failures {
        assert!(
            matches!(failure.error, Error::MalformedNestedArchive { .. }),
            "{failure}"
        );
    }
    assert!(outcome.table.contains("ok.txt"));
    assert_eq!(outcome.table.len(), 1);
    assert!(matches!(outcome.into_result(), Err(Error::BatchFailed(f)) if f.len() == 2));
    Ok(())
}
