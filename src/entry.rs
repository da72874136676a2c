//! The in-memory form of one archive member before assembly.

use crate::error::{Error, Result};
use crate::zip::{CompressionMethod, DosDateTime};

/// A compressed archive member plus the metadata needed to write its headers.
///
/// Entries are immutable once built. `compressed_size` is always the length
/// of the owned payload, which never includes a header or data descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    archive_path: String,
    compression_method: CompressionMethod,
    crc32: u32,
    uncompressed_size: u64,
    compressed: Box<[u8]>,
    last_modified: DosDateTime,
}

impl RawEntry {
    pub fn new(
        archive_path: String,
        compression_method: CompressionMethod,
        crc32: u32,
        uncompressed_size: u64,
        compressed: impl Into<Box<[u8]>>,
        last_modified: DosDateTime,
    ) -> Result<Self> {
        validate_archive_path(&archive_path)?;
        Ok(Self {
            archive_path,
            compression_method,
            crc32,
            uncompressed_size,
            compressed: compressed.into(),
            last_modified,
        })
    }

    pub fn archive_path(&self) -> &str {
        &self.archive_path
    }

    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed.len() as u64
    }

    pub fn compressed_bytes(&self) -> &[u8] {
        &self.compressed
    }

    pub fn last_modified(&self) -> DosDateTime {
        self.last_modified
    }
}

/// Check that a name is a relative, forward-slash path with no `..` escapes.
///
/// A single trailing `/` is allowed and marks a directory entry.
pub fn validate_archive_path(path: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidPath {
            path: path.to_string(),
            reason,
        })
    };

    if path.is_empty() {
        return invalid("empty name");
    }
    if path.starts_with('/') {
        return invalid("absolute path");
    }
    if path.contains('\\') {
        return invalid("backslash separator");
    }
    if path.len() > u16::MAX as usize {
        return invalid("name longer than 65535 bytes");
    }

    let trimmed = path.strip_suffix('/').unwrap_or(path);
    for segment in trimmed.split('/') {
        match segment {
            "" => return invalid("empty path segment"),
            "." | ".." => return invalid("relative path segment"),
            _ => {}
        }
    }
    Ok(())
}
