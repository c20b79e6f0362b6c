//! Data File Handles
//!
//! An opaque handle to a file produced or consumed by a task. The engine
//! only ever checks existence and creates empty placeholders; reading and
//! writing content is entirely the business of module implementations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque handle to a file on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFile {
    path: PathBuf,
}

impl DataFile {
    /// Creates a handle for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the underlying path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name, if the path has one.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Returns the file stem (name without the last extension).
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|n| n.to_str())
    }

    /// Returns true if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the file (and its parent directories) if it does not exist.
    pub fn create(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        if !self.path.exists() {
            fs::File::create(&self.path)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_name_and_stem() {
        let file = DataFile::new("/data/sample1.fastq");
        assert_eq!(file.name(), Some("sample1.fastq"));
        assert_eq!(file.stem(), Some("sample1"));
    }

    #[test]
    fn test_exists() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out.txt");

        let file = DataFile::new(&path);
        assert!(!file.exists());

        fs::write(&path, "content").unwrap();
        assert!(file.exists());
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested/dir/out.txt");

        let file = DataFile::new(&path);
        file.create().unwrap();

        assert!(file.exists());
        assert!(temp_dir.path().join("nested/dir").exists());
    }

    #[test]
    fn test_create_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out.txt");
        fs::write(&path, "existing").unwrap();

        let file = DataFile::new(&path);
        file.create().unwrap();

        // Existing content is left untouched.
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing");
    }
}
