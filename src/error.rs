use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while collecting and assembling an archive.
#[derive(Debug, Error)]
pub enum Error {
    /// A single input file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A `.zip` input could not be parsed structurally.
    #[error("malformed nested archive {}: {reason}", .path.display())]
    MalformedNestedArchive { path: PathBuf, reason: String },

    /// Two entries resolved to the same archive path. Informational only.
    #[error("duplicate archive path {path}, keeping one candidate")]
    DuplicatePath { path: String },

    #[error("invalid archive path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The archive would need ZIP64 extensions, which are not supported.
    #[error("{what} of {value} exceeds the ZIP32 limit")]
    Zip64Required { what: &'static str, value: u64 },

    /// The output destination is unusable.
    #[error("failed to write archive {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A worker task panicked or was cancelled.
    #[error("worker for {} did not complete: {reason}", .path.display())]
    Worker { path: PathBuf, reason: String },

    /// One or more inputs failed, so no archive was produced.
    #[error("{} input file(s) could not be archived", .0.len())]
    BatchFailed(Vec<InputFailure>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed production task, keyed by the input that caused it.
#[derive(Debug)]
pub struct InputFailure {
    pub path: PathBuf,
    pub error: Error,
}

impl fmt::Display for InputFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}
