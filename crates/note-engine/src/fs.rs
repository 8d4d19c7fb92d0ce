//! FileSystem trait abstraction for the store's root directory.
//!
//! Implementations:
//! - `InMemoryFs` - For testing, with per-path fault injection
//! - `NativeFs` - Uses tokio::fs
//!
//! Paths are relative to the store root. The store itself is flat, so in
//! practice every path is a bare file name.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Storage abstraction the engine persists through.
///
/// Every call is a suspend point; callers must not assume completion order
/// beyond the awaited result.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents, replacing any previous content
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Delete a file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    /// Paths whose writes and deletes fail with an I/O error
    failing: RwLock<HashSet<String>>,
    /// Paths whose reads fail with an I/O error
    failing_reads: RwLock<HashSet<String>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            failing: RwLock::new(HashSet::new()),
            failing_reads: RwLock::new(HashSet::new()),
        }
    }

    /// Make every write and delete of `path` fail until cleared
    pub fn fail_on(&self, path: &str) {
        let path = Self::normalize_path(path);
        self.failing.write().unwrap().insert(path);
    }

    /// Make every read of `path` fail until cleared
    pub fn fail_read_on(&self, path: &str) {
        let path = Self::normalize_path(path);
        self.failing_reads.write().unwrap().insert(path);
    }

    pub fn clear_failures(&self) {
        self.failing.write().unwrap().clear();
        self.failing_reads.write().unwrap().clear();
    }

    /// Copy of every stored file, keyed by path
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.read().unwrap().clone()
    }

    /// File names currently stored, sorted
    pub fn file_names(&self) -> Vec<String> {
        self.files.read().unwrap().keys().cloned().collect()
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        if self.failing.read().unwrap().contains(path) {
            return Err(FsError::Io(format!("injected failure for {}", path)));
        }
        Ok(())
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        if self.failing_reads.read().unwrap().contains(&path) {
            return Err(FsError::Io(format!("injected read failure for {}", path)));
        }
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        self.check_failure(&path)?;

        let mut files = self.files.write().unwrap();
        files.insert(path, content.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let files = self.files.read().unwrap();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for file_path in files.keys() {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if seen.insert(dir.to_string()) {
                        entries.push(FileEntry {
                            name: dir.to_string(),
                            is_dir: true,
                        });
                    }
                }
                None => {
                    if seen.insert(rest.to_string()) {
                        entries.push(FileEntry {
                            name: rest.to_string(),
                            is_dir: false,
                        });
                    }
                }
            }
        }

        if !path.is_empty() && entries.is_empty() {
            return Err(FsError::NotFound(path));
        }

        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        self.check_failure(&path)?;

        let mut files = self.files.write().unwrap();
        if files.remove(&path).is_some() {
            Ok(())
        } else {
            Err(FsError::NotFound(path))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        Ok(files.contains_key(&path))
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This allows sharing a filesystem between multiple engines in tests
#[async_trait]
impl<T: FileSystem + Send + Sync> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_fs_basic_operations() {
        let fs = InMemoryFs::new();

        fs.write("foo.md", b"hello world").await.unwrap();

        let content = fs.read("foo.md").await.unwrap();
        assert_eq!(content, b"hello world");

        assert!(fs.exists("foo.md").await.unwrap());
        assert!(!fs.exists("bar.md").await.unwrap());

        fs.delete("foo.md").await.unwrap();
        assert!(!fs.exists("foo.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_fs_injected_read_failure() {
        let fs = InMemoryFs::new();
        fs.write("foo.md", b"hello").await.unwrap();
        fs.fail_read_on("foo.md");

        assert!(matches!(fs.read("foo.md").await, Err(FsError::Io(_))));
        assert!(fs.exists("foo.md").await.unwrap());
        fs.write("foo.md", b"again").await.unwrap();

        fs.clear_failures();
        assert_eq!(fs.read("foo.md").await.unwrap(), b"again");
    }

    #[tokio::test]
    async fn test_inmemory_fs_lists_root() {
        let fs = InMemoryFs::new();
        fs.write("foo.md", b"").await.unwrap();
        fs.write("foo.one.md", b"").await.unwrap();
        fs.write("assets/img.png", b"").await.unwrap();

        let mut entries: Vec<_> = fs
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        entries.sort();

        assert_eq!(
            entries,
            vec![
                ("assets".to_string(), true),
                ("foo.md".to_string(), false),
                ("foo.one.md".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let fs = InMemoryFs::new();
        assert!(matches!(fs.delete("nope.md").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let fs = InMemoryFs::new();
        fs.write("foo.md", b"v1").await.unwrap();
        fs.fail_on("foo.md");

        assert!(matches!(fs.write("foo.md", b"v2").await, Err(FsError::Io(_))));
        assert!(matches!(fs.delete("foo.md").await, Err(FsError::Io(_))));
        assert_eq!(fs.read("foo.md").await.unwrap(), b"v1");

        fs.clear_failures();
        fs.write("foo.md", b"v2").await.unwrap();
        assert_eq!(fs.read("foo.md").await.unwrap(), b"v2");
    }
}
