//! Fresh DEFLATE compression of a single input file.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::SystemTime;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use log::trace;

use crate::entry::RawEntry;
use crate::error::{Error, Result};
use crate::zip::{CompressionMethod, DosDateTime};

/// Default zlib-style compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Compresses whole files into self-contained [`RawEntry`] values.
///
/// Files are read and compressed in one shot. The method is always DEFLATE,
/// even when it does not shrink the data.
#[derive(Debug, Clone, Copy)]
pub struct EntryCompressor {
    level: Compression,
}

impl EntryCompressor {
    /// `level` is clamped to 0..=9.
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Read `path` and compress it under `archive_path`.
    ///
    /// The modification time falls back to now when the platform cannot report one.
    pub fn compress_file(&self, path: &Path, archive_path: String) -> Result<RawEntry> {
        let read_error = |source| Error::SourceRead {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_error)?;
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(read_error)?;
        drop(file);

        self.compress_bytes(archive_path, &data, DosDateTime::from_system_time(modified))
    }

    pub fn compress_bytes(
        &self,
        archive_path: String,
        data: &[u8],
        modified: DosDateTime,
    ) -> Result<RawEntry> {
        let crc32 = crc32fast::hash(data);

        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 64), self.level);
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        trace!(
            "compressed {} from {} to {} bytes",
            archive_path,
            data.len(),
            compressed.len()
        );

        RawEntry::new(
            archive_path,
            CompressionMethod::Deflate,
            crc32,
            data.len() as u64,
            compressed,
            modified,
        )
    }
}

impl Default for EntryCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn compresses_with_deflate_and_source_crc() {
        let data = b"hello hello hello hello hello".repeat(20);
        let entry = EntryCompressor::default()
            .compress_bytes("greeting.txt".to_string(), &data, DosDateTime::MIN)
            .unwrap();

        assert_eq!(entry.compression_method(), CompressionMethod::Deflate);
        assert_eq!(entry.crc32(), crc32fast::hash(&data));
        assert_eq!(entry.uncompressed_size(), data.len() as u64);
        assert!(entry.compressed_size() < data.len() as u64);
        assert_eq!(inflate(entry.compressed_bytes()), data);
    }

    #[test]
    fn empty_and_incompressible_input_stay_deflate() {
        let compressor = EntryCompressor::new(9);
        let empty = compressor
            .compress_bytes("empty".to_string(), b"", DosDateTime::MIN)
            .unwrap();
        assert_eq!(empty.compression_method(), CompressionMethod::Deflate);
        assert_eq!(empty.uncompressed_size(), 0);
        assert_eq!(inflate(empty.compressed_bytes()), b"");

        let noise: Vec<u8> = (0..512u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let entry = compressor
            .compress_bytes("noise".to_string(), &noise, DosDateTime::MIN)
            .unwrap();
        assert_eq!(entry.compression_method(), CompressionMethod::Deflate);
        assert_eq!(inflate(entry.compressed_bytes()), noise);
    }

    #[test]
    fn missing_file_is_a_source_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EntryCompressor::default()
            .compress_file(&dir.path().join("absent.txt"), "absent.txt".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::SourceRead { .. }));
    }
}
