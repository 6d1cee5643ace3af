//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use sync_core::fs::{FileEntry, FileSystem, FsError, Result};
use tokio::fs;

/// Native filesystem rooted at the sync root
#[derive(Debug, Clone)]
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Map a root-relative `/`-separated path onto the native filesystem.
    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.base_path.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }
}

fn io_error(path: &str, e: std::io::Error) -> FsError {
    match e.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        ErrorKind::IsADirectory => FsError::IsDirectory(path.to_string()),
        ErrorKind::NotADirectory => FsError::NotDirectory(path.to_string()),
        _ => FsError::Io {
            path: path.to_string(),
            message: e.to_string(),
        },
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        if fs::metadata(&full_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        fs::read(&full_path).await.map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| io_error(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Symlinks are not followed, so a link to a directory lists as a file
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Entry removed mid-listing
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(path, e)),
            };

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::fs::walk;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("notes/sub/a.md", b"hello").await.unwrap();

        assert_eq!(fs.read("notes/sub/a.md").await.unwrap(), b"hello");
        assert!(dir.path().join("notes").join("sub").join("a.md").is_file());
    }

    #[tokio::test]
    async fn test_read_errors_are_classified() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        fs.mkdir("folder").await.unwrap();

        assert!(matches!(fs.read("missing.md").await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.read("folder").await, Err(FsError::IsDirectory(_))));
    }

    #[tokio::test]
    async fn test_mkdir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.mkdir("a/b").await.unwrap();
        fs.mkdir("a/b").await.unwrap();

        assert!(dir.path().join("a").join("b").is_dir());
    }

    #[tokio::test]
    async fn test_walk_skips_hidden_entries() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        fs.write("notes/a.md", b"a").await.unwrap();
        fs.write(".git/config", b"x").await.unwrap();
        fs.write("notes/.draft.md", b"x").await.unwrap();

        let paths: Vec<String> = walk(&fs).await.unwrap().into_iter().map(|e| e.path).collect();

        assert_eq!(paths, vec!["notes", "notes/a.md"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_does_not_follow_directory_symlinks() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        fs.write("notes/a.md", b"a").await.unwrap();
        std::os::unix::fs::symlink(dir.path().join("notes"), dir.path().join("notes/loop"))
            .unwrap();

        let entries = walk(&fs).await.unwrap();

        let dirs: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(dirs, vec!["notes"]);
        assert!(entries.iter().any(|e| e.path == "notes/loop" && !e.is_dir));
    }
}
