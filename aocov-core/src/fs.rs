//! Filesystem abstractions used for artifact storage.

use std::path::Path;

use crate::error::Result;

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Create or truncate a file with the given contents.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    /// Read a file into memory.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Whether a regular file exists at the path.
    fn is_file(&self, path: &Path) -> bool;
    /// Remove a file; a file that does not exist is not an error.
    fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        Ok(std::fs::write(path, contents)?)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
