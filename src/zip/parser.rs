//! Low-level structural ZIP reader.
//!
//! This module reads ZIP records from any source that implements the
//! [`ReadAt`] trait. Two access paths are supported:
//!
//! 1. Sequential: walk local file headers from offset 0, which is how nested
//!    archives are merged (the local headers carry method, CRC and sizes).
//! 2. Indexed: locate the End of Central Directory (EOCD) from the end of the
//!    file and read the central directory. This fills in members written with
//!    a trailing data descriptor, and lets callers verify a finished archive.
//!
//! Payloads are never inflated here.

use std::io::Cursor;
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// What follows the previous member in a sequential scan.
#[derive(Debug)]
pub enum NextRecord {
    /// A local file header, with the offset its payload starts at.
    Member {
        header: LocalFileHeader,
        data_offset: u64,
    },
    /// The central directory, the EOCD, or plain end of file.
    End,
}

/// Structural ZIP parser, generic over the data source.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset. Archives with a trailing comment are
    /// handled by searching backwards for the signature.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Common case first: no comment, EOCD is the last 22 bytes.
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        if buf.len() >= EndOfCentralDirectory::SIZE {
            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                    continue;
                }
                // A real EOCD's comment runs exactly to the end of the file.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd =
                        EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("End of Central Directory not found")
    }

    /// Read every central directory record, in stored order.
    pub async fn central_directory(&self) -> Result<Vec<CentralDirectoryHeader>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if eocd.is_zip64() {
            bail!("ZIP64 archives are not supported");
        }

        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > eocd_offset {
            bail!(
                "central directory ({} bytes at {}) overlaps the EOCD at {}",
                cd_size,
                cd_offset,
                eocd_offset
            );
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader
            .read_exact_at(cd_offset, &mut cd_data)
            .await
            .context("truncated central directory")?;

        let mut records = Vec::with_capacity(eocd.total_entries as usize);
        let mut cursor = Cursor::new(&cd_data[..]);
        for index in 0..eocd.total_entries {
            let record = CentralDirectoryHeader::read_from(&mut cursor)
                .with_context(|| format!("central directory record {index}"))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Read whatever record starts at `offset` during a sequential scan.
    pub async fn next_record(&self, offset: u64) -> Result<NextRecord> {
        if offset == self.size {
            return Ok(NextRecord::End);
        }
        if offset + 4 > self.size {
            bail!("truncated record at offset {offset}");
        }

        let mut sig = [0u8; 4];
        self.reader.read_exact_at(offset, &mut sig).await?;
        if sig == CentralDirectoryHeader::SIGNATURE || sig == EndOfCentralDirectory::SIGNATURE {
            return Ok(NextRecord::End);
        }
        if sig != LocalFileHeader::SIGNATURE {
            bail!("unexpected signature {:02x?} at offset {}", sig, offset);
        }

        let header = self.read_local_header(offset).await?;
        let data_offset = offset + header.encoded_len();
        Ok(NextRecord::Member {
            header,
            data_offset,
        })
    }

    /// Read a Local File Header including its name and extra field.
    pub async fn read_local_header(&self, offset: u64) -> Result<LocalFileHeader> {
        let mut fixed = [0u8; LocalFileHeader::SIZE];
        self.reader
            .read_exact_at(offset, &mut fixed)
            .await
            .with_context(|| format!("truncated local header at offset {offset}"))?;
        let (mut header, name_len, extra_len) = LocalFileHeader::from_bytes(&fixed)?;

        let mut variable = vec![0u8; name_len as usize + extra_len as usize];
        self.reader
            .read_exact_at(offset + LocalFileHeader::SIZE as u64, &mut variable)
            .await
            .with_context(|| format!("truncated file name at offset {offset}"))?;
        header.extra_field = variable.split_off(name_len as usize);
        header.file_name = variable;

        Ok(header)
    }

    /// Length of the data descriptor starting at `offset`.
    ///
    /// The descriptor is 12 bytes, or 16 when it opens with its optional signature.
    pub async fn data_descriptor_len(&self, offset: u64) -> Result<u64> {
        let mut sig = [0u8; 4];
        self.reader
            .read_exact_at(offset, &mut sig)
            .await
            .with_context(|| format!("truncated data descriptor at offset {offset}"))?;
        let len = if sig == DATA_DESCRIPTOR_SIGNATURE { 16 } else { 12 };
        if offset + len > self.size {
            bail!("truncated data descriptor at offset {offset}");
        }
        Ok(len)
    }

    /// Copy `len` raw payload bytes starting at `offset`.
    pub async fn read_payload(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset + len > self.size {
            bail!(
                "payload of {} bytes at offset {} runs past end of archive ({} bytes)",
                len,
                offset,
                self.size
            );
        }
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact_at(offset, &mut buf).await?;
        Ok(buf)
    }
}
