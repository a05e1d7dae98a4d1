//! Atomic file writes for generated code.
//!
//! Content is written to a temporary file next to the target and renamed into
//! place, so a target path either holds the complete new content or is left
//! untouched.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors raised while persisting text to disk
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("File already exists: {}", .0.display())]
    FileExists(PathBuf),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `content` to `path`, creating intermediate directories.
///
/// Fails with [`WriteError::FileExists`] when the target exists and
/// `overwrite` is false.
pub fn write_atomic(path: &Path, content: &str, overwrite: bool) -> Result<(), WriteError> {
    if !overwrite && path.exists() {
        return Err(WriteError::FileExists(path.to_path_buf()));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| WriteError::io(&parent, e))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| WriteError::io(path, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| WriteError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| WriteError::io(path, e))?;

    if overwrite {
        tmp.persist(path).map_err(|e| WriteError::io(path, e.error))?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                WriteError::FileExists(path.to_path_buf())
            } else {
                WriteError::io(path, e.error)
            }
        })?;
    }

    debug!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}

/// Hash content (hex-encoded SHA256)
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.txt");

        write_atomic(&path, "hello", false).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_write_refuses_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("existing.txt");
        std::fs::write(&path, "original").unwrap();

        let result = write_atomic(&path, "replacement", false);
        assert!(matches!(result, Err(WriteError::FileExists(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("existing.txt");
        std::fs::write(&path, "original").unwrap();

        write_atomic(&path, "replacement", true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "replacement");
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // A regular file cannot be used as a directory
        let result = write_atomic(&blocker.join("child.txt"), "data", true);
        assert!(matches!(result, Err(WriteError::Io { .. })));
    }

    #[test]
    fn test_hash_content_consistency() {
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
        assert_eq!(hash_content("abc").len(), 64);
    }
}
