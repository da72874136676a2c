//! Append-only output destination for the assembled archive.
//!
//! Bytes go to a `.partial` sibling of the target and only replace the
//! target on [`OutputFile::commit`]. An uncommitted sink deletes its partial
//! file when dropped, so a failed run never leaves a truncated archive behind
//! and never clobbers a previous valid one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};

pub struct OutputFile {
    target: PathBuf,
    partial: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl OutputFile {
    /// Create the partial file, including any missing parent directories.
    pub fn create(target: &Path) -> Result<Self> {
        let partial = partial_path(target);
        let wrap = |source| Error::OutputWrite {
            path: target.to_path_buf(),
            source,
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(wrap)?;
            }
        }
        let file = File::create(&partial).map_err(wrap)?;
        debug!("writing archive to {}", partial.display());

        Ok(Self {
            target: target.to_path_buf(),
            partial,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Flush, sync and move the finished archive over the target path.
    pub fn commit(mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let result = finish(writer).and_then(|()| fs::rename(&self.partial, &self.target));
        result.map_err(|source| Error::OutputWrite {
            path: self.target.clone(),
            source,
        })?;
        // renamed away; nothing left for Drop to clean up
        self.partial = PathBuf::new();
        Ok(())
    }

    /// Attach the target path to a write error raised while streaming into this sink.
    pub fn wrap_error(&self, err: Error) -> Error {
        match err {
            Error::Io(source) => Error::OutputWrite {
                path: self.target.clone(),
                source,
            },
            other => other,
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("output already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.partial.as_os_str().is_empty() {
            return;
        }
        // close before unlinking
        self.writer.take();
        if let Err(err) = fs::remove_file(&self.partial) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove {}: {}", self.partial.display(), err);
            }
        }
    }
}

fn finish(writer: BufWriter<File>) -> io::Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// `<target>.partial`, next to the target.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("archive.zip"));
    name.push(".partial");
    target.with_file_name(name)
}
