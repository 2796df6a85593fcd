//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Type of file system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// A directory entry returned by read_dir
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Dot-files and underscore-prefixed entries are editor, VCS or OS droppings
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.') || self.name.starts_with('_')
    }
}

/// Abstraction over the file operations the orchestrator performs itself.
///
/// The compiler subprocess writes its own artifacts; everything the
/// orchestrator reads back (sources, aux state) or deletes goes through here.
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// List directory contents
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Canonicalize a path
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Remove a single file. Removing a missing file is not an error.
    fn remove_file(&self, path: &Path) -> Result<bool>;

    /// Read a file if it exists, `None` otherwise
    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if self.is_file(path) {
            self.read_to_string(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry() {
        let entry = DirEntry {
            path: PathBuf::from("/paper/main.tex"),
            name: "main.tex".to_string(),
            file_type: FileType::File,
        };
        assert_eq!(entry.path(), Path::new("/paper/main.tex"));
        assert_eq!(entry.file_name(), "main.tex");
        assert_eq!(entry.file_type(), FileType::File);
        assert!(!entry.is_hidden());
    }

    #[test]
    fn test_hidden_entries() {
        for name in [".main.tex.swp", "_minted", ".passbuild"] {
            let entry = DirEntry {
                path: PathBuf::from(name),
                name: name.to_string(),
                file_type: FileType::File,
            };
            assert!(entry.is_hidden(), "{} should be hidden", name);
        }
    }
}
