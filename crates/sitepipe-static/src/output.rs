//! Output file records and writing them to disk.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::AssetError;

/// A file produced by a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    /// Path relative to the destination directory
    pub path: PathBuf,

    /// File contents
    pub contents: Vec<u8>,

    /// Source map JSON, written beside the file as `<path>.map`
    pub source_map: Option<String>,
}

impl OutputFile {
    /// Create a record without a source map.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            source_map: None,
        }
    }

    /// Attach a source map.
    pub fn with_source_map(mut self, source_map: String) -> Self {
        self.source_map = Some(source_map);
        self
    }

    /// Path of the companion source map.
    pub fn source_map_path(&self) -> PathBuf {
        map_path(&self.path)
    }
}

/// `<path>.map` for a given path.
pub fn map_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".map");
    PathBuf::from(name)
}

/// Write records under `dest`, skipping files whose bytes are unchanged.
///
/// Returns the number of files written.
pub fn emit(dest: &Path, files: &[OutputFile]) -> Result<usize, AssetError> {
    let mut written = 0;

    for file in files {
        let target = dest.join(&file.path);
        if write_if_changed(&target, &file.contents)? {
            written += 1;
        }

        if let Some(source_map) = &file.source_map {
            if write_if_changed(&map_path(&target), source_map.as_bytes())? {
                written += 1;
            }
        }
    }

    Ok(written)
}

/// Write a file unless it already holds exactly these bytes.
pub fn write_if_changed(path: &Path, contents: &[u8]) -> Result<bool, AssetError> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents {
            tracing::debug!("Unchanged: {}", path.display());
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AssetError::write(parent, e))?;
    }

    fs::write(path, contents).map_err(|e| AssetError::write(path, e))?;
    tracing::debug!("Wrote {}", path.display());

    Ok(true)
}

/// Resolve `.` and `..` segments without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
