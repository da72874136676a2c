//! Main entry point for the parzip CLI application.
//!
//! Discovers input files, collects compressed entries in parallel, and writes
//! the final archive only if every input succeeded.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parzip::io::sink::partial_path;
use parzip::walk::{self, WalkOptions, expand_home};
use parzip::{ArchiveAssembler, ArchiveSummary, Cli, LocalFileReader, OutputFile, ZipParser, collect};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let output = std::path::absolute(expand_home(&cli.output))
        .with_context(|| format!("invalid output path {}", cli.output))?;
    let options = WalkOptions {
        strip_root: cli.strip_root,
        merge_archives: !cli.no_merge,
        exclude: vec![output.clone(), partial_path(&output)],
    };

    let started = Instant::now();
    let mut inputs = Vec::new();
    for arg in &cli.inputs {
        let found = walk::enumerate(&expand_home(arg), &options)
            .with_context(|| format!("cannot enumerate input {arg}"))?;
        inputs.extend(found);
    }
    if inputs.is_empty() {
        warn!("no input files found, writing an empty archive");
    }

    let outcome = collect(inputs, &cli.collector_config()).await;
    info!("{} entries loaded and compressed", outcome.table.len());
    for failure in &outcome.failures {
        error!("{failure}");
    }
    let table = outcome.into_result()?;

    let assembler = ArchiveAssembler::new(table)?;
    let target = output.clone();
    let summary = tokio::task::spawn_blocking(move || write_archive(&target, assembler))
        .await
        .context("archive writer panicked")??;

    if cli.verify {
        verify(&output, &summary).await?;
    }

    info!(
        "{} created in {:.3} sec ({})",
        output.display(),
        started.elapsed().as_secs_f64(),
        format_size(summary.total_size)
    );
    Ok(())
}

/// Stream the archive into a fresh sink and publish it.
///
/// Any error drops the sink uncommitted, which removes the partial file.
fn write_archive(path: &Path, assembler: ArchiveAssembler) -> parzip::Result<ArchiveSummary> {
    let mut sink = OutputFile::create(path)?;
    let summary = assembler
        .write_to(&mut sink)
        .map_err(|err| sink.wrap_error(err))?;
    sink.commit()?;
    Ok(summary)
}

/// Re-read the central directory of the written archive and check it.
async fn verify(path: &Path, summary: &ArchiveSummary) -> Result<()> {
    let reader = LocalFileReader::new(path)?;
    let parser = ZipParser::new(Arc::new(reader));
    let records = parser.central_directory().await?;

    if records.len() != summary.entries {
        bail!(
            "central directory lists {} entries, expected {}",
            records.len(),
            summary.entries
        );
    }
    if let Some(pair) = records.windows(2).find(|w| w[0].file_name >= w[1].file_name) {
        bail!(
            "central directory out of order at {}",
            pair[1].file_name_lossy()
        );
    }
    for record in &records {
        let local = parser
            .read_local_header(record.local_header_offset as u64)
            .await?;
        if local.file_name != record.file_name || local.crc32 != record.crc32 {
            bail!("local header mismatch for {}", record.file_name_lossy());
        }
    }

    info!("verified {} entries", records.len());
    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
