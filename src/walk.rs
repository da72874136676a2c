//! Input discovery: turns command-line roots into [`InputFile`] values.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use log::trace;
use walkdir::WalkDir;

use crate::collector::InputFile;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Name entries relative to the root itself rather than its parent.
    pub strip_root: bool,
    /// Treat `.zip` files as nested archives to merge.
    pub merge_archives: bool,
    /// Paths never to pick up, typically the output archive.
    pub exclude: Vec<PathBuf>,
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(arg: &str) -> PathBuf {
    let rest = match arg.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return PathBuf::from(arg),
    };
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => {
            let mut path = PathBuf::from(home);
            let rest = rest.trim_start_matches(['/', '\\']);
            if !rest.is_empty() {
                path.push(rest);
            }
            path
        }
        None => PathBuf::from(arg),
    }
}

/// List every regular file under `root` in a stable order.
///
/// A root that is itself a file yields one input named after it.
pub fn enumerate(root: &Path, options: &WalkOptions) -> Result<Vec<InputFile>> {
    let root = std::path::absolute(root).map_err(|source| Error::SourceRead {
        path: root.to_path_buf(),
        source,
    })?;
    let metadata = fs::metadata(&root).map_err(|source| Error::SourceRead {
        path: root.clone(),
        source,
    })?;

    let mut files = Vec::new();
    if metadata.is_dir() {
        walk_dir(&root, &mut files)?;
    } else {
        files.push(root.clone());
    }

    let base = if metadata.is_dir() && options.strip_root {
        root.as_path()
    } else {
        root.parent().unwrap_or(&root)
    };

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        if options.exclude.iter().any(|excluded| *excluded == path) {
            trace!("skipping {}", path.display());
            continue;
        }
        let name = archive_name(&path, base).ok_or_else(|| Error::InvalidPath {
            path: path.display().to_string(),
            reason: "not below the input root",
        })?;
        inputs.push(if options.merge_archives && is_zip(&path) {
            InputFile::nested(path, name)
        } else {
            InputFile::plain(path, name)
        });
    }
    Ok(inputs)
}

fn walk_dir(root: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_error(root, err))?;
        // links are not descended into, but a link to a file is read as that file
        if entry.file_type().is_dir() || entry.path().is_dir() {
            continue;
        }
        out.push(entry.into_path());
    }
    Ok(())
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    Error::SourceRead {
        path,
        source: err.into(),
    }
}

/// Forward-slash name of `path` relative to `base`.
fn archive_name(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}
