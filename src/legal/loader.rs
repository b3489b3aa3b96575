//! Document loading
//!
//! The import resolver never touches the filesystem directly; it goes through a
//! [`SourceReader`]. [`FsReader`] is the production implementation, [`MemoryReader`] serves
//! tests and embedders that keep documents in memory.

use crate::legal::error::ReadError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Reads document sources by path.
pub trait SourceReader {
    /// Read the full text at `path`.
    fn read(&self, path: &Path) -> Result<String, ReadError>;

    /// Produce the identity used for cycle detection.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize_path(path)
    }
}

/// Reads documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl SourceReader for FsReader {
    fn read(&self, path: &Path) -> Result<String, ReadError> {
        fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
            _ => ReadError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path))
    }
}

/// In-memory document store keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, String>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(normalize_path(path.as_ref()), content.into());
    }
}

impl SourceReader for MemoryReader {
    fn read(&self, path: &Path) -> Result<String, ReadError> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| ReadError::NotFound(path.to_path_buf()))
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into their parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `target` relative to the directory of the document that referenced it.
pub fn resolve_relative(base_dir: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        base_dir.join(target)
    }
}
