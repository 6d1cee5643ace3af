//! FileSystem trait abstraction over the sync root.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in sync-daemon) - Uses tokio::fs
//!
//! All paths are relative to the sync root and use `/` separators. The
//! empty string names the root itself.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("IO error on {path}: {message}")]
    Io { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Root-relative entry produced by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub is_dir: bool,
}

/// Platform-independent access to the sync root.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file (creates parent
    /// directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Create directory (and parents if needed); existing directories are fine
    async fn mkdir(&self, path: &str) -> Result<()>;
}

/// Join a root-relative directory and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Root-relative directory containing `path` (`""` for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Whether a name is hidden (dotfile or dot-directory).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// List every directory and file under the root, excluding the root and
/// hidden entries. Output is sorted by path.
///
/// Subdirectories that fail to list are logged and skipped; only a
/// failure to list the root itself is an error.
pub async fn walk<F: FileSystem + ?Sized>(fs: &F) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut stack = vec![String::new()];

    while let Some(dir) = stack.pop() {
        let listing = match fs.list(&dir).await {
            Ok(listing) => listing,
            Err(e) if dir.is_empty() => return Err(e),
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir, e);
                continue;
            }
        };

        for entry in listing {
            if is_hidden(&entry.name) {
                continue;
            }
            let path = join(&dir, &entry.name);
            if entry.is_dir {
                stack.push(path.clone());
            }
            entries.push(TreeEntry {
                path,
                is_dir: entry.is_dir,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory filesystem for testing
#[derive(Debug, Default)]
pub struct InMemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    /// Insert every missing ancestor of `path` as a directory.
    fn ensure_dirs(nodes: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join(&current, segment);
            match nodes.get(&current) {
                Some(Node::File(_)) => return Err(FsError::NotDirectory(current)),
                Some(Node::Dir) => {}
                None => {
                    nodes.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    /// All file paths with their contents, for assertions.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .filter_map(|(path, node)| match node {
                Node::File(bytes) => Some((path.clone(), bytes.clone())),
                Node::Dir => None,
            })
            .collect()
    }

    /// All directory paths, for assertions.
    pub fn dirs(&self) -> Vec<String> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::Dir))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize(path);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Dir) => Err(FsError::IsDirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize(path);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        Self::ensure_dirs(&mut nodes, parent_dir(&path))?;
        if let Some(Node::Dir) = nodes.get(&path) {
            return Err(FsError::IsDirectory(path));
        }
        nodes.insert(path, Node::File(content.to_vec()));
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize(path);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        if !path.is_empty() {
            match nodes.get(&path) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(FsError::NotDirectory(path)),
                None => return Err(FsError::NotFound(path)),
            }
        }

        Ok(nodes
            .iter()
            .filter(|(candidate, _)| parent_dir(candidate) == path && !candidate.is_empty())
            .map(|(candidate, node)| FileEntry {
                name: candidate
                    .rsplit_once('/')
                    .map(|(_, name)| name)
                    .unwrap_or(candidate.as_str())
                    .to_string(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize(path);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        Self::ensure_dirs(&mut nodes, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_fs_basic_operations() {
        let fs = InMemoryFs::new();

        fs.write("test.md", b"hello world").await.unwrap();
        assert_eq!(fs.read("test.md").await.unwrap(), b"hello world");
        assert!(matches!(fs.read("missing.md").await, Err(FsError::NotFound(_))));

        fs.write("test.md", b"replaced").await.unwrap();
        assert_eq!(fs.read("test.md").await.unwrap(), b"replaced");
    }

    #[tokio::test]
    async fn test_inmemory_fs_directories() {
        let fs = InMemoryFs::new();

        // Write creates parent directories
        fs.write("a/b/c.md", b"content").await.unwrap();
        assert_eq!(fs.dirs(), vec!["a", "a/b"]);

        let entries = fs.list("a").await.unwrap();
        assert_eq!(
            entries,
            vec![FileEntry {
                name: "b".into(),
                is_dir: true
            }]
        );

        // mkdir on an existing directory is not an error
        fs.mkdir("a/b").await.unwrap();
        assert!(matches!(
            fs.write("a/b", b"x").await,
            Err(FsError::IsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_walk_lists_tree_sorted_without_hidden() {
        let fs = InMemoryFs::new();
        fs.write("notes/readme.md", b"# Hi").await.unwrap();
        fs.write("notes/sub/deep.md", b"deep").await.unwrap();
        fs.write("top.md", b"top").await.unwrap();
        fs.write(".git/config", b"x").await.unwrap();
        fs.write("notes/.DS_Store", b"x").await.unwrap();
        fs.mkdir("empty").await.unwrap();

        let entries = walk(&fs).await.unwrap();
        let paths: Vec<_> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.is_dir))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("empty", true),
                ("notes", true),
                ("notes/readme.md", false),
                ("notes/sub", true),
                ("notes/sub/deep.md", false),
                ("top.md", false),
            ]
        );
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join("", "a.md"), "a.md");
        assert_eq!(join("notes", "a.md"), "notes/a.md");
        assert_eq!(parent_dir("notes/sub/a.md"), "notes/sub");
        assert_eq!(parent_dir("a.md"), "");
    }
}
