//! ZIP record encoding, structural parsing and nested-archive pass-through.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (local header, central directory
//!   header, EOCD, DOS timestamps) with both decode and encode
//! - [`parser`]: structural reads over any [`ReadAt`](crate::io::ReadAt) source
//! - [`extractor`]: copies the compressed members of an existing archive into
//!   [`RawEntry`](crate::RawEntry) values without inflating them
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Limitations
//!
//! - No ZIP64 in either direction
//! - No encryption support
//! - No multi-disk archive support

mod extractor;
mod parser;
mod structures;

pub use extractor::{NestedArchiveExtractor, extract_nested_archive};
pub use parser::{NextRecord, ZipParser};
pub use structures::*;
