use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use log::debug;

use crate::entry::RawEntry;
use crate::error::{Error, Result};
use crate::io::{LocalFileReader, ReadAt};

use super::parser::{NextRecord, ZipParser};
use super::structures::{CentralDirectoryHeader, LocalFileHeader, ZIP64_MARKER};

/// Turns a ZIP archive into one [`RawEntry`] per member without inflating anything.
///
/// Members are walked through their local headers. Payload bytes, method, CRC,
/// sizes and timestamp are copied verbatim.
pub struct NestedArchiveExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> NestedArchiveExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// Extract every member in stored order.
    pub async fn extract(&self) -> anyhow::Result<Vec<RawEntry>> {
        let mut entries = Vec::new();
        // central directory keyed by local header offset, loaded on first need
        let mut index: Option<HashMap<u64, CentralDirectoryHeader>> = None;
        let mut offset = 0u64;

        loop {
            let (header, data_offset) = match self.parser.next_record(offset).await? {
                NextRecord::Member {
                    header,
                    data_offset,
                } => (header, data_offset),
                NextRecord::End => break,
            };
            let name = header.file_name_lossy();

            if header.is_encrypted() {
                bail!("member {name} is encrypted");
            }

            let (crc32, compressed_size, uncompressed_size) = if header.has_data_descriptor() {
                if index.is_none() {
                    index = Some(self.load_index().await?);
                }
                let record = index
                    .as_ref()
                    .and_then(|index| index.get(&offset))
                    .ok_or_else(|| anyhow!("no central directory record for member {name} at offset {offset}"))?;
                (record.crc32, record.compressed_size, record.uncompressed_size)
            } else {
                (header.crc32, header.compressed_size, header.uncompressed_size)
            };

            if compressed_size == ZIP64_MARKER || uncompressed_size == ZIP64_MARKER {
                bail!("member {name} requires ZIP64");
            }

            let payload = self
                .parser
                .read_payload(data_offset, compressed_size as u64)
                .await
                .with_context(|| format!("member {name}"))?;

            let mut next = data_offset + compressed_size as u64;
            if header.has_data_descriptor() {
                next += self.parser.data_descriptor_len(next).await?;
            }

            let entry = Self::member_entry(&header, name, crc32, uncompressed_size, payload)?;
            entries.push(entry);
            offset = next;
        }

        Ok(entries)
    }

    async fn load_index(&self) -> anyhow::Result<HashMap<u64, CentralDirectoryHeader>> {
        let records = self.parser.central_directory().await?;
        Ok(records
            .into_iter()
            .map(|record| (record.local_header_offset as u64, record))
            .collect())
    }

    fn member_entry(
        header: &LocalFileHeader,
        name: String,
        crc32: u32,
        uncompressed_size: u32,
        payload: Vec<u8>,
    ) -> anyhow::Result<RawEntry> {
        RawEntry::new(
            name,
            header.compression_method,
            crc32,
            uncompressed_size as u64,
            payload,
            header.modified,
        )
        .map_err(anyhow::Error::from)
    }
}

/// Open `path` and pass its members through as raw entries.
///
/// Read failures become [`Error::SourceRead`]; anything structurally wrong,
/// including truncation, becomes [`Error::MalformedNestedArchive`].
pub async fn extract_nested_archive(path: &Path) -> Result<Vec<RawEntry>> {
    let reader = LocalFileReader::new(path).map_err(|err| classify(path, err))?;
    let extractor = NestedArchiveExtractor::new(Arc::new(reader));
    let entries = extractor.extract().await.map_err(|err| classify(path, err))?;
    debug!("{}: passing through {} members", path.display(), entries.len());
    Ok(entries)
}

fn classify(path: &Path, err: anyhow::Error) -> Error {
    let io_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>());
    match io_error {
        Some(source) if source.kind() != io::ErrorKind::UnexpectedEof => Error::SourceRead {
            path: path.to_path_buf(),
            source: io::Error::new(source.kind(), format!("{err:#}")),
        },
        _ => Error::MalformedNestedArchive {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        },
    }
}
