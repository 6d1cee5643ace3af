//! Directory watch set for the sync root.
//!
//! Every directory is watched non-recursively and tracked explicitly, so
//! directories created later can be registered (and removed ones dropped)
//! as events arrive. The set is owned by the engine loop; the notify
//! callback only forwards raw events into a channel.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Sync root {} is not a directory", .0.display())]
    RootMissing(PathBuf),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// Raw notification stream consumed by the engine loop.
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// The watched directories under a sync root.
pub struct WatchSet {
    root: PathBuf,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl WatchSet {
    /// Create an empty watch set for `root` and the channel its events
    /// arrive on. Nothing is watched until [`WatchSet::register_tree`].
    pub fn new(root: PathBuf) -> Result<(Self, EventReceiver)> {
        if !root.is_dir() {
            return Err(WatchError::RootMissing(root));
        }
        // Canonicalize the path to resolve symlinks. On macOS, /var/folders/...
        // is actually /private/var/folders/..., and FSEvents reports the real path.
        let root = root.canonicalize().unwrap_or(root);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver dropped means the engine has stopped
            let _ = event_tx.send(res);
        })?;

        Ok((
            Self {
                root,
                watcher,
                watched: HashSet::new(),
            },
            event_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// Watch `dir` and every non-hidden directory below it.
    ///
    /// Directories that vanish or cannot be watched are skipped. Returns
    /// how many directories were newly registered.
    pub fn register_tree(&mut self, dir: &Path) -> usize {
        let mut registered = 0;
        let mut stack = vec![dir.to_path_buf()];

        while let Some(dir) = stack.pop() {
            if !self.watched.contains(&dir) {
                match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        self.watched.insert(dir.clone());
                        registered += 1;
                    }
                    Err(e) => {
                        debug!("Not watching {}: {}", dir.display(), e);
                        continue;
                    }
                }
            }

            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir && !is_hidden_name(&entry.file_name().to_string_lossy()) {
                    stack.push(entry.path());
                }
            }
        }

        registered
    }

    /// Stop watching `dir` and anything registered below it.
    pub fn unregister(&mut self, dir: &Path) {
        let removed: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for path in removed {
            // The OS usually drops the watch itself once the directory is gone
            let _ = self.watcher.unwatch(&path);
            self.watched.remove(&path);
            debug!("Unwatched {}", path.display());
        }
    }

    /// Update the watch set for `event` and report whether it should
    /// (re)start the push debounce.
    pub fn handle(&mut self, event: &Event) -> bool {
        let relevant: Vec<&PathBuf> = event
            .paths
            .iter()
            .filter(|p| !self.is_hidden(p))
            .collect();
        if relevant.is_empty() {
            return false;
        }

        match event.kind {
            EventKind::Create(_) => {
                for path in &relevant {
                    if is_real_dir(path) {
                        self.register_tree(path);
                    }
                }
                true
            }
            EventKind::Remove(_) => {
                for path in &relevant {
                    self.unregister(path);
                }
                true
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Renames arrive as a remove of the old name and a create of the new
                for path in &relevant {
                    if is_real_dir(path) {
                        self.register_tree(path);
                    } else if !path.exists() {
                        self.unregister(path);
                    }
                }
                true
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => false,
            EventKind::Modify(_) => true,
            _ => false,
        }
    }

    /// Whether `path` is, or is inside, a hidden entry below the root.
    fn is_hidden(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .any(|c| is_hidden_name(&c.as_os_str().to_string_lossy())),
            Err(_) => false,
        }
    }
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Directory check that does not follow symlinks.
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use tempfile::TempDir;

    fn watch_set(dir: &TempDir) -> WatchSet {
        let (set, _rx) = WatchSet::new(dir.path().to_path_buf()).unwrap();
        set
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = WatchSet::new(dir.path().join("missing"));
        assert!(matches!(result, Err(WatchError::RootMissing(_))));
    }

    #[test]
    fn test_register_tree_skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("notes/sub")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        let mut set = watch_set(&dir);
        let root = set.root().to_path_buf();

        assert_eq!(set.register_tree(&root), 3);
        assert!(set.is_watched(&root.join("notes/sub")));
        assert!(!set.is_watched(&root.join(".git")));

        // Registering again adds nothing
        assert_eq!(set.register_tree(&root), 0);
    }

    #[test]
    fn test_created_directory_is_registered_and_removed_one_dropped() {
        let dir = TempDir::new().unwrap();
        let mut set = watch_set(&dir);
        let root = set.root().to_path_buf();
        set.register_tree(&root);

        let new_dir = root.join("fresh");
        std::fs::create_dir_all(new_dir.join("inner")).unwrap();
        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(new_dir.clone());
        assert!(set.handle(&created));
        assert!(set.is_watched(&new_dir.join("inner")));

        std::fs::remove_dir_all(&new_dir).unwrap();
        let removed = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(new_dir.clone());
        assert!(set.handle(&removed));
        assert!(!set.is_watched(&new_dir));
        assert!(!set.is_watched(&new_dir.join("inner")));
        assert!(set.is_watched(&root));
    }

    #[test]
    fn test_vanished_directory_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut set = watch_set(&dir);
        let root = set.root().to_path_buf();

        let gone = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("gone"));
        assert!(set.handle(&gone));
        assert!(!set.is_watched(&root.join("gone")));
    }

    #[test]
    fn test_event_classification() {
        let dir = TempDir::new().unwrap();
        let mut set = watch_set(&dir);
        let root = set.root().to_path_buf();

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root.join("a.md"));
        assert!(set.handle(&write));

        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)))
            .add_path(root.join("a.md"));
        assert!(!set.handle(&chmod));

        let hidden = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root.join(".git/index"));
        assert!(!set.handle(&hidden));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlinks_are_not_registered() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        let mut set = watch_set(&dir);
        let root = set.root().to_path_buf();
        std::os::unix::fs::symlink(root.join("notes"), root.join("notes/loop")).unwrap();

        assert_eq!(set.register_tree(&root), 2);
        assert!(!set.is_watched(&root.join("notes/loop")));

        let created = Event::new(EventKind::Create(CreateKind::Any)).add_path(root.join("link"));
        std::os::unix::fs::symlink(root.join("notes"), root.join("link")).unwrap();
        assert!(set.handle(&created));
        assert!(!set.is_watched(&root.join("link")));
    }
}
