//! File system access behind a trait, so the pipeline runs against the real
//! disk or an in-memory tree (tests, embedding hosts).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileProviderError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("io error: {0}")]
    Io(String),
}

pub trait FileProvider {
    /// Read the contents of the file at `path`.
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError>;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Canonicalize `path` into the absolute form used as a `FileId`.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileProviderError>;
}

/// The real file system.
#[derive(Debug, Clone, Default)]
pub struct DefaultFileProvider;

impl FileProvider for DefaultFileProvider {
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileProviderError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                FileProviderError::PermissionDenied(path.to_path_buf())
            }
            _ => FileProviderError::Io(e.to_string()),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileProviderError> {
        path.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileProviderError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                FileProviderError::PermissionDenied(path.to_path_buf())
            }
            _ => FileProviderError::Io(e.to_string()),
        })
    }
}

/// A purely in-memory tree keyed by normalized absolute paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contents` under `path` (normalized, must be absolute).
    pub fn add_file(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .insert(normalize(path.as_ref()), contents.into());
    }
}

impl FileProvider for InMemoryFileProvider {
    fn read_file(&self, path: &Path) -> Result<String, FileProviderError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| FileProviderError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileProviderError> {
        let normalized = normalize(path);
        if self.files.contains_key(&normalized) {
            Ok(normalized)
        } else {
            Err(FileProviderError::NotFound(path.to_path_buf()))
        }
    }
}

/// Lexically resolve `.` and `..` components. Symlinks do not exist in the
/// in-memory tree, so this is a faithful canonicalization for it.
fn normalize(path: &Path) -> PathBuf {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let mut fp = InMemoryFileProvider::new();
        fp.add_file("/lib/rc.asdl", "devices: {}");
        assert!(fp.exists(Path::new("/lib/rc.asdl")));
        assert!(fp.exists(Path::new("/lib/./rc.asdl")));
        assert_eq!(fp.read_file(Path::new("/lib/rc.asdl")).unwrap(), "devices: {}");
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d.asdl")),
            PathBuf::from("/a/c/d.asdl")
        );
    }

    #[test]
    fn missing_files_are_not_found() {
        let fp = InMemoryFileProvider::new();
        assert!(matches!(
            fp.read_file(Path::new("/nope.asdl")),
            Err(FileProviderError::NotFound(_))
        ));
    }
}
