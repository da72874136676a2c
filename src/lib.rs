//! # parzip
//!
//! Build a single ZIP archive from many files, compressing them in parallel.
//!
//! Every input file is compressed independently into a self-contained
//! [`RawEntry`]. Inputs that are themselves ZIP archives are not recompressed:
//! their members' compressed bytes are copied verbatim. Once every input has
//! been processed, the [`ArchiveAssembler`] sorts the entries by path and
//! writes local headers, data, central directory and EOCD in one forward pass.
//!
//! ## Features
//!
//! - Parallel DEFLATE compression on the tokio blocking pool
//! - Pass-through merging of nested ZIP archives, including members written
//!   with data descriptors
//! - Deterministic, path-sorted output layout
//! - All-or-nothing runs: a failed input or write never leaves a partial archive
//!
//! ZIP64 and encryption are not supported.
//!
//! ## Example
//!
//! ```no_run
//! use parzip::{ArchiveAssembler, CollectorConfig, InputFile, OutputFile, collect};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let inputs = vec![
//!         InputFile::plain("/a/1.txt", "1.txt"),
//!         InputFile::nested("/a/assets.zip", "assets.zip"),
//!     ];
//!     let table = collect(inputs, &CollectorConfig::default()).await.into_result()?;
//!
//!     let mut sink = OutputFile::create(Path::new("out.zip"))?;
//!     ArchiveAssembler::new(table)?.write_to(&mut sink)?;
//!     sink.commit()?;
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod cli;
pub mod collector;
pub mod compressor;
pub mod entry;
pub mod error;
pub mod io;
pub mod walk;
pub mod zip;

pub use assembler::{ArchiveAssembler, ArchiveSummary};
pub use cli::Cli;
pub use collector::{
    CollectOutcome, CollectorConfig, DuplicatePolicy, EntryTable, InputFile, InputKind, collect,
};
pub use compressor::EntryCompressor;
pub use entry::RawEntry;
pub use error::{Error, InputFailure, Result};
pub use io::{LocalFileReader, MemoryReader, OutputFile, ReadAt};
pub use zip::{NestedArchiveExtractor, ZipParser, extract_nested_archive};
