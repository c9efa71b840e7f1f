//! Flat file store rooted at one directory.
//!
//! Both endpoints keep their files directly under a root directory; names
//! coming off the wire are validated before they are joined onto it, so a
//! request can never reach outside the root.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Check that `name` is a plain file name.
///
/// Rejects empty names, `.` and `..`, whitespace (names travel
/// space-separated) and path separators.
pub fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == '\0');
    if bad {
        Err(Error::InvalidFileName(name.to_string()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root).await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// `true` if `name` is valid and names a regular file.
    pub async fn file_exists(&self, name: &str) -> bool {
        let Ok(path) = self.path(name) else {
            return false;
        };
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Sorted names of the regular files in the root.
    ///
    /// Names that are not valid UTF-8 are skipped.
    pub async fn list_file_names(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::debug!("[store] skipping non UTF-8 file name {raw:?}"),
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path(name)?).await?)
    }

    /// Create or overwrite `name`.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        Ok(tokio::fs::write(self.path(name)?, data).await?)
    }

    /// Delete `name`; returns `false` if it did not exist.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        for ok in ["a.txt", "photo.jpeg", ".hidden", "x"] {
            assert!(validate_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", ".", "..", "a b", "dir/a", "..\\a", "tab\there"] {
            assert!(matches!(validate_name(bad), Err(Error::InvalidFileName(_))), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn write_read_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.list_file_names().await.unwrap().is_empty());

        store.write("b.txt", b"bee").await.unwrap();
        store.write("a.txt", b"ay").await.unwrap();
        tokio::fs::create_dir(dir.path().join("subdir")).await.unwrap();

        assert!(store.file_exists("a.txt").await);
        assert!(!store.file_exists("subdir").await);
        assert!(!store.file_exists("../a.txt").await);
        assert_eq!(store.list_file_names().await.unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(store.read("b.txt").await.unwrap(), b"bee");

        assert!(store.remove("a.txt").await.unwrap());
        assert!(!store.remove("a.txt").await.unwrap());
        assert_eq!(store.list_file_names().await.unwrap(), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn open_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let store = FileStore::open(&root).await.unwrap();
        assert!(root.is_dir());
        assert!(store.read("missing").await.is_err());
    }
}
