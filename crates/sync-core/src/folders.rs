//! Folder hierarchy resolution.
//!
//! The remote hands back a flat list of `{id, parentId, name}` records in
//! no particular order. Full paths are recovered by repeated passes: top
//! level folders are placed first, then any folder whose parent already
//! has a path, until a pass places nothing new. Folders whose ancestor
//! chain never resolves (dangling or cyclic parents) stay unplaced.

use crate::identity::derive_id;
use crate::model::Folder;
use std::collections::HashMap;
use tracing::debug;

/// Bidirectional path <-> folder id index.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    id_to_path: HashMap<String, String>,
    path_to_id: HashMap<String, String>,
}

impl FolderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every local folder path under its derived identity, as if
    /// each one were about to be created.
    pub fn seeded<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::new();
        for path in paths {
            index.insert(path, derive_id(path));
        }
        index
    }

    /// Record `path` as belonging to `id`, replacing any earlier id for
    /// the same path.
    pub fn insert(&mut self, path: &str, id: String) {
        self.id_to_path.insert(id.clone(), path.to_string());
        self.path_to_id.insert(path.to_string(), id);
    }

    /// Place remote folders into the index by fixed-point iteration.
    ///
    /// Returns the folders that could not be placed. Always terminates: a
    /// pass that places nothing ends the loop.
    pub fn place<'a>(&mut self, folders: &'a [Folder]) -> Vec<&'a Folder> {
        let mut pending: Vec<&Folder> = folders.iter().collect();
        let mut passes = 0;

        while !pending.is_empty() {
            passes += 1;
            let before = pending.len();
            pending.retain(|folder| {
                let path = match folder.parent() {
                    None => folder.name.clone(),
                    Some(parent) => match self.id_to_path.get(parent) {
                        Some(parent_path) => format!("{}/{}", parent_path, folder.name),
                        None => return true,
                    },
                };
                self.insert(&path, folder.id.clone());
                false
            });
            if pending.len() == before {
                break;
            }
        }

        if !pending.is_empty() {
            debug!(
                "{} folder(s) left unresolved after {} pass(es)",
                pending.len(),
                passes
            );
        }
        pending
    }

    pub fn id_for(&self, path: &str) -> Option<&str> {
        self.path_to_id.get(path).map(String::as_str)
    }

    pub fn path_for(&self, id: &str) -> Option<&str> {
        self.id_to_path.get(id).map(String::as_str)
    }

    /// All indexed folder paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.path_to_id.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.path_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_id.is_empty()
    }
}

/// Map each local folder path to the remote folder id it should use.
///
/// Local paths start out with their derived ids; remote folders that
/// resolve to the same path override the seed so existing folders are
/// reused.
pub fn resolve_folder_ids<'a>(
    local_paths: impl IntoIterator<Item = &'a str>,
    remote: &[Folder],
) -> FolderIndex {
    let mut index = FolderIndex::seeded(local_paths);
    index.place(remote);
    index
}
