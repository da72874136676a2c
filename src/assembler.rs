//! Single forward pass that lays out the final archive.
//!
//! Entries are written in archive path order: every local header followed by
//! its payload, then one central directory record per entry pointing back at
//! the offsets recorded during the first pass, then the EOCD. Nothing is ever
//! patched after it is written, so any append-only sink works.

use std::io::Write;

use log::debug;

use crate::collector::EntryTable;
use crate::entry::RawEntry;
use crate::error::{Error, Result};
use crate::zip::{
    CentralDirectoryHeader, EndOfCentralDirectory, FLAG_UTF8, LocalFileHeader, VERSION_MADE_BY,
    VERSION_NEEDED,
};

/// Byte layout of a written archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub central_directory_offset: u64,
    pub central_directory_size: u64,
    pub total_size: u64,
}

/// A sorted, limit-checked batch of entries ready to be written once.
#[derive(Debug)]
pub struct ArchiveAssembler {
    entries: Vec<RawEntry>,
}

impl ArchiveAssembler {
    pub fn new(table: EntryTable) -> Result<Self> {
        Self::from_entries(table.into_sorted())
    }

    /// Sort `entries` by archive path and check that the archive fits ZIP32.
    ///
    /// Paths must be unique; the collector guarantees that for its tables.
    pub fn from_entries(mut entries: Vec<RawEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.archive_path().cmp(b.archive_path()));
        if let Some(pair) = entries
            .windows(2)
            .find(|pair| pair[0].archive_path() == pair[1].archive_path())
        {
            return Err(Error::DuplicatePath {
                path: pair[0].archive_path().to_string(),
            });
        }

        check_limit("entry count", entries.len() as u64, u16::MAX as u64 - 1)?;

        let mut local_size = 0u64;
        let mut central_size = 0u64;
        for entry in &entries {
            check_limit("compressed size", entry.compressed_size(), u32::MAX as u64 - 1)?;
            check_limit("uncompressed size", entry.uncompressed_size(), u32::MAX as u64 - 1)?;
            let name_len = entry.archive_path().len() as u64;
            local_size += LocalFileHeader::SIZE as u64 + name_len + entry.compressed_size();
            central_size += CentralDirectoryHeader::SIZE as u64 + name_len;
        }
        // the last local header and the central directory must both be addressable
        check_limit("central directory offset", local_size, u32::MAX as u64 - 1)?;
        check_limit("central directory size", central_size, u32::MAX as u64 - 1)?;

        Ok(Self { entries })
    }

    /// Write the whole archive to `out`, start to finish.
    pub fn write_to<W: Write>(self, mut out: W) -> Result<ArchiveSummary> {
        let mut offset = 0u64;
        let mut local_offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            local_offsets.push(offset as u32);
            let header = local_header(entry);
            header.write_to(&mut out)?;
            out.write_all(entry.compressed_bytes())?;
            offset += header.encoded_len() + entry.compressed_size();
        }

        let cd_offset = offset;
        for (entry, local_offset) in self.entries.iter().zip(local_offsets) {
            let header = central_header(entry, local_offset);
            header.write_to(&mut out)?;
            offset += header.encoded_len();
        }
        let cd_size = offset - cd_offset;

        EndOfCentralDirectory::new(self.entries.len() as u16, cd_size as u32, cd_offset as u32)
            .write_to(&mut out)?;
        offset += EndOfCentralDirectory::SIZE as u64;
        out.flush()?;

        debug!(
            "wrote {} entries, central directory {} bytes at {}",
            self.entries.len(),
            cd_size,
            cd_offset
        );

        Ok(ArchiveSummary {
            entries: self.entries.len(),
            central_directory_offset: cd_offset,
            central_directory_size: cd_size,
            total_size: offset,
        })
    }

    pub fn to_bytes(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

fn check_limit(what: &'static str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(Error::Zip64Required { what, value });
    }
    Ok(())
}

fn name_flags(entry: &RawEntry) -> u16 {
    if entry.archive_path().is_ascii() { 0 } else { FLAG_UTF8 }
}

fn local_header(entry: &RawEntry) -> LocalFileHeader {
    LocalFileHeader {
        version_needed: VERSION_NEEDED,
        flags: name_flags(entry),
        compression_method: entry.compression_method(),
        modified: entry.last_modified(),
        crc32: entry.crc32(),
        compressed_size: entry.compressed_size() as u32,
        uncompressed_size: entry.uncompressed_size() as u32,
        file_name: entry.archive_path().as_bytes().to_vec(),
        extra_field: Vec::new(),
    }
}

fn central_header(entry: &RawEntry, local_header_offset: u32) -> CentralDirectoryHeader {
    CentralDirectoryHeader {
        version_made_by: VERSION_MADE_BY,
        version_needed: VERSION_NEEDED,
        flags: name_flags(entry),
        compression_method: entry.compression_method(),
        modified: entry.last_modified(),
        crc32: entry.crc32(),
        compressed_size: entry.compressed_size() as u32,
        uncompressed_size: entry.uncompressed_size() as u32,
        internal_attrs: 0,
        external_attrs: 0,
        local_header_offset,
        file_name: entry.archive_path().as_bytes().to_vec(),
    }
}
