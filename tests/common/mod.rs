#![allow(dead_code)]

use std::io::Read;
use std::sync::Arc;

use anyhow::{Result, bail};
use flate2::read::DeflateDecoder;

use parzip::zip::{CentralDirectoryHeader, CompressionMethod};
use parzip::{MemoryReader, ZipParser};

/// One member of an archive, read back through its central directory record.
pub struct Member {
    pub name: String,
    pub record: CentralDirectoryHeader,
    pub compressed: Vec<u8>,
}

impl Member {
    pub fn contents(&self) -> Result<Vec<u8>> {
        match self.record.compression_method {
            CompressionMethod::Stored => Ok(self.compressed.clone()),
            CompressionMethod::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(&self.compressed[..]).read_to_end(&mut out)?;
                Ok(out)
            }
            other => bail!("cannot read {other}"),
        }
    }
}

/// Read every member through the central directory, in directory order.
pub async fn read_members(archive: Vec<u8>) -> Result<Vec<Member>> {
    let parser = ZipParser::new(Arc::new(MemoryReader::new(archive)));
    let mut members = Vec::new();
    for record in parser.central_directory().await? {
        let local = parser
            .read_local_header(record.local_header_offset as u64)
            .await?;
        let data_offset = record.local_header_offset as u64 + local.encoded_len();
        let compressed = parser
            .read_payload(data_offset, record.compressed_size as u64)
            .await?;
        members.push(Member {
            name: record.file_name_lossy(),
            record,
            compressed,
        });
    }
    Ok(members)
}

pub fn names(members: &[Member]) -> Vec<&str> {
    members.iter().map(|m| m.name.as_str()).collect()
}
