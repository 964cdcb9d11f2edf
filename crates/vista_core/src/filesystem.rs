//! File access used to read template sources and persist compiled artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::ViewResult;

/// Minimal file access the view layer depends on.
///
/// Everything that touches disk goes through this trait so a caller can
/// substitute an in-memory or instrumented implementation.
pub trait Filesystem: Send + Sync {
    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is an existing directory.
    fn is_directory(&self, path: &Path) -> bool;

    /// Read the whole file as UTF-8 text.
    fn get(&self, path: &Path) -> ViewResult<String>;

    /// Write `contents` to `path`, replacing any previous file.
    fn put(&self, path: &Path, contents: &str) -> ViewResult<()>;

    /// Modification time of `path`.
    fn last_modified(&self, path: &Path) -> ViewResult<SystemTime>;

    /// Remove the file at `path`. Missing files are not an error.
    fn delete(&self, path: &Path) -> ViewResult<()>;

    /// Create `path` and all of its parents if needed.
    fn ensure_directory(&self, path: &Path) -> ViewResult<()>;

    /// Regular files directly inside `dir`, sorted by path.
    fn files(&self, dir: &Path) -> ViewResult<Vec<PathBuf>>;
}

/// [`Filesystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn get(&self, path: &Path) -> ViewResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn put(&self, path: &Path, contents: &str) -> ViewResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        debug!("Wrote {} bytes to {:?}", contents.len(), path);
        Ok(())
    }

    fn last_modified(&self, path: &Path) -> ViewResult<SystemTime> {
        Ok(fs::metadata(path)?.modified()?)
    }

    fn delete(&self, path: &Path) -> ViewResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_directory(&self, path: &Path) -> ViewResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn files(&self, dir: &Path) -> ViewResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_creates_parents_and_get_reads_back() {
        let temp = tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let path = temp.path().join("nested/dir/file.txt");

        fs.put(&path, "hello").unwrap();
        assert!(fs.exists(&path));
        assert_eq!(fs.get(&path).unwrap(), "hello");
        assert!(fs.last_modified(&path).is_ok());
    }

    #[test]
    fn test_delete_missing_file_is_ok() {
        let temp = tempdir().unwrap();
        let fs = LocalFilesystem::new();
        assert!(fs.delete(&temp.path().join("missing")).is_ok());
    }

    #[test]
    fn test_files_lists_only_regular_files() {
        let temp = tempdir().unwrap();
        let fs = LocalFilesystem::new();
        fs.put(&temp.path().join("b.json"), "{}").unwrap();
        fs.put(&temp.path().join("a.json"), "{}").unwrap();
        fs.ensure_directory(&temp.path().join("sub")).unwrap();

        let files = fs.files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.json"));
        assert!(fs.is_directory(&temp.path().join("sub")));
    }

    #[test]
    fn test_get_missing_file_is_io_error() {
        let temp = tempdir().unwrap();
        let err = LocalFilesystem.get(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, crate::ViewError::Io(_)));
    }
}
