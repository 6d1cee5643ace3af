//! Folder, document and operation types shared by both reconcilers.

use serde::{Deserialize, Serialize};

/// A folder as known to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
}

impl Folder {
    /// Parent id, treating an empty string the same as no parent.
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|p| !p.is_empty())
    }
}

/// A text document and where it lives in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Root-relative path with `/` separators
    pub relative_path: String,
}

/// Everything the remote reported as changed since a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub folders: Vec<Folder>,
    pub documents: Vec<Document>,
    /// High-water mark to echo back on the next fetch
    pub cursor: String,
}

/// Payload of a folder create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderCreate {
    pub id: String,
    /// Full root-relative path of the folder
    pub path: String,
    /// Path of the parent folder, `None` for top-level folders
    pub parent_path: Option<String>,
    pub name: String,
}

impl FolderCreate {
    /// Build a create for the folder at `path`, splitting off its parent.
    pub fn at_path(id: String, path: &str) -> Self {
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (Some(parent.to_string()), name.to_string()),
            None => (None, path.to_string()),
        };
        Self {
            id,
            path: path.to_string(),
            parent_path,
            name,
        }
    }
}

/// Payload of a document create or update. Both carry the full document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpsert {
    pub id: String,
    pub folder_id: Option<String>,
    pub title: String,
    pub content: String,
    pub relative_path: String,
}

/// A single change sent to the remote store.
///
/// Order inside a batch matters: folders must precede their children and
/// the documents that live in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    FolderCreate(FolderCreate),
    DocumentCreate(DocumentUpsert),
    DocumentUpdate(DocumentUpsert),
}

impl Operation {
    /// The root-relative path this operation targets.
    pub fn path(&self) -> &str {
        match self {
            Operation::FolderCreate(f) => &f.path,
            Operation::DocumentCreate(d) | Operation::DocumentUpdate(d) => &d.relative_path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Operation::FolderCreate(_))
    }
}
