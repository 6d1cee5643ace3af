//! In-memory remote store for testing.
//!
//! Mirrors how the real server applies operations:
//! - folder create resolves its parent by path and is skipped when a
//!   folder with the same (parent, name) already exists
//! - document create/update is an upsert keyed by id; an update never
//!   moves a document to a new relative path
//!
//! Changes are stamped with a revision so `fetch_changes` returns only
//! what changed after the cursor it is given, like the real delta API.

use crate::folders::FolderIndex;
use crate::gateway::{GatewayError, RemoteGateway, Result};
use crate::images::BlobHost;
use crate::model::{ChangeSet, Document, DocumentUpsert, Folder, FolderCreate, Operation};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A recorded `upload_blob` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub owner_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub url: String,
}

#[derive(Debug, Default)]
struct State {
    revision: u64,
    folders: Vec<(Folder, u64)>,
    documents: Vec<(Document, u64)>,
    blobs: BTreeMap<String, Vec<u8>>,
    apply_calls: Vec<Vec<Operation>>,
    uploads: Vec<Upload>,
    downloads: Vec<String>,
    fetches: Vec<Option<String>>,
    fail_fetch: bool,
    fail_apply: bool,
    fail_updates: bool,
    fail_uploads: bool,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn cursor(&self) -> String {
        format!("rev-{}", self.revision)
    }

    fn folder_index(&self) -> FolderIndex {
        let folders: Vec<Folder> = self.folders.iter().map(|(f, _)| f.clone()).collect();
        let mut index = FolderIndex::new();
        index.place(&folders);
        index
    }

    fn create_folder(&mut self, op: &FolderCreate) {
        let index = self.folder_index();
        let parent_id = op
            .parent_path
            .as_deref()
            .and_then(|p| index.id_for(p))
            .map(String::from);

        let duplicate = self.folders.iter().any(|(f, _)| {
            f.id == op.id || (f.name == op.name && f.parent().map(String::from) == parent_id)
        });
        if duplicate {
            return;
        }

        let revision = self.bump();
        self.folders.push((
            Folder {
                id: op.id.clone(),
                parent_id,
                name: op.name.clone(),
            },
            revision,
        ));
    }

    fn upsert_document(&mut self, doc: &DocumentUpsert) {
        if doc.id.is_empty() || doc.relative_path.is_empty() {
            return;
        }
        let revision = self.bump();
        if let Some((existing, rev)) = self.documents.iter_mut().find(|(d, _)| d.id == doc.id) {
            existing.title = doc.title.clone();
            existing.content = doc.content.clone();
            existing.folder_id = doc.folder_id.clone();
            *rev = revision;
            return;
        }
        self.documents.push((
            Document {
                id: doc.id.clone(),
                folder_id: doc.folder_id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                relative_path: doc.relative_path.clone(),
            },
            revision,
        ));
    }
}

/// Fully in-memory [`RemoteGateway`] that records every call.
#[derive(Debug)]
pub struct InMemoryGateway {
    blob_host: BlobHost,
    state: Mutex<State>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_blob_host(BlobHost::default())
    }

    /// Serve uploaded blobs from `https://<host>/...`.
    pub fn with_blob_host(blob_host: BlobHost) -> Self {
        Self {
            blob_host,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a folder as if another client had created it.
    pub fn seed_folder(&self, folder: Folder) {
        let mut state = self.state();
        let revision = state.bump();
        state.folders.push((folder, revision));
    }

    /// Add a document as if another client had created it.
    pub fn seed_document(&self, document: Document) {
        let mut state = self.state();
        let revision = state.bump();
        state.documents.push((document, revision));
    }

    /// Make `bytes` downloadable at `url`.
    pub fn put_blob(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.state().blobs.insert(url.into(), bytes);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.state().fail_fetch = fail;
    }

    /// Reject every `apply_operations` call.
    pub fn set_fail_apply(&self, fail: bool) {
        self.state().fail_apply = fail;
    }

    /// Reject batches that contain a document update.
    pub fn set_fail_updates(&self, fail: bool) {
        self.state().fail_updates = fail;
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state().folders.iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.state().documents.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.state()
            .documents
            .iter()
            .find(|(d, _)| d.id == id)
            .map(|(d, _)| d.clone())
    }

    /// Full paths of all remote folders that resolve.
    pub fn folder_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state()
            .folder_index()
            .paths()
            .map(String::from)
            .collect();
        paths.sort();
        paths
    }

    /// Every accepted `apply_operations` batch, oldest first.
    pub fn apply_calls(&self) -> Vec<Vec<Operation>> {
        self.state().apply_calls.clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state().uploads.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.state().downloads.clone()
    }

    /// Cursors passed to `fetch_changes`, oldest first.
    pub fn fetches(&self) -> Vec<Option<String>> {
        self.state().fetches.clone()
    }
}

fn parse_cursor(cursor: Option<&str>) -> u64 {
    cursor
        .and_then(|c| c.strip_prefix("rev-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeSet> {
        let mut state = self.state();
        state.fetches.push(cursor.map(String::from));
        if state.fail_fetch {
            return Err(GatewayError::Status {
                status: 500,
                body: "fetch rejected".into(),
            });
        }

        let since = parse_cursor(cursor);
        Ok(ChangeSet {
            folders: state
                .folders
                .iter()
                .filter(|(_, rev)| *rev > since)
                .map(|(f, _)| f.clone())
                .collect(),
            documents: state
                .documents
                .iter()
                .filter(|(_, rev)| *rev > since)
                .map(|(d, _)| d.clone())
                .collect(),
            cursor: state.cursor(),
        })
    }

    async fn apply_operations(&self, operations: &[Operation]) -> Result<String> {
        let mut state = self.state();
        let has_update = operations
            .iter()
            .any(|op| matches!(op, Operation::DocumentUpdate(_)));
        if state.fail_apply || (state.fail_updates && has_update) {
            return Err(GatewayError::Status {
                status: 500,
                body: "operations rejected".into(),
            });
        }

        state.apply_calls.push(operations.to_vec());
        for op in operations {
            match op {
                Operation::FolderCreate(folder) => state.create_folder(folder),
                Operation::DocumentCreate(doc) | Operation::DocumentUpdate(doc) => {
                    state.upsert_document(doc)
                }
            }
        }
        Ok(state.cursor())
    }

    async fn upload_blob(&self, owner_id: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let mut state = self.state();
        if state.fail_uploads {
            return Err(GatewayError::Transport("upload refused".into()));
        }
        if !state.documents.iter().any(|(d, _)| d.id == owner_id) {
            return Err(GatewayError::Status {
                status: 404,
                body: "Document not found".into(),
            });
        }

        let url = format!(
            "https://{}/{}/{}",
            self.blob_host.as_str(),
            owner_id,
            filename
        );
        state.blobs.insert(url.clone(), bytes.clone());
        state.uploads.push(Upload {
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            bytes,
            url: url.clone(),
        });
        Ok(url)
    }

    async fn download_blob(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.downloads.push(url.to_string());
        state
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| GatewayError::BlobNotFound(url.to_string()))
    }
}
