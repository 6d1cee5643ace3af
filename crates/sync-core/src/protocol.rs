//! JSON wire format of the remote document API.
//!
//! The reconcilers only deal in [`Operation`]; this module is the single
//! place where operations become the `{op, type, path, data}` objects the
//! server expects, and where server responses are decoded.

use crate::model::{ChangeSet, Document, DocumentUpsert, Folder, Operation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpVerb {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Folder,
    Document,
}

/// Payload of a wire operation.
///
/// Untagged: the entity kind travels in the operation's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireData {
    Document(WireDocument),
    Folder(WireFolder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFolder {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub folder_id: Option<String>,
    pub title: String,
    pub content: String,
    pub relative_path: String,
}

impl From<&DocumentUpsert> for WireDocument {
    fn from(doc: &DocumentUpsert) -> Self {
        Self {
            id: doc.id.clone(),
            folder_id: doc.folder_id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            relative_path: doc.relative_path.clone(),
        }
    }
}

/// One element of the `operations` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOperation {
    pub op: OpVerb,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub path: String,
    pub data: WireData,
}

impl From<&Operation> for WireOperation {
    fn from(op: &Operation) -> Self {
        match op {
            Operation::FolderCreate(folder) => Self {
                op: OpVerb::Create,
                kind: EntityKind::Folder,
                path: folder.path.clone(),
                data: WireData::Folder(WireFolder {
                    id: folder.id.clone(),
                }),
            },
            Operation::DocumentCreate(doc) => Self {
                op: OpVerb::Create,
                kind: EntityKind::Document,
                path: doc.relative_path.clone(),
                data: WireData::Document(doc.into()),
            },
            Operation::DocumentUpdate(doc) => Self {
                op: OpVerb::Update,
                kind: EntityKind::Document,
                path: doc.relative_path.clone(),
                data: WireData::Document(doc.into()),
            },
        }
    }
}

/// Body of `POST /api/documents/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub operations: Vec<WireOperation>,
}

impl ApplyRequest {
    pub fn new(operations: &[Operation]) -> Self {
        Self {
            operations: operations.iter().map(WireOperation::from).collect(),
        }
    }
}

/// Response of `POST /api/documents/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub last_sync_at: String,
}

/// Response of `GET /api/documents/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub documents: Vec<Document>,
    pub last_sync_at: String,
}

impl From<ChangesResponse> for ChangeSet {
    fn from(resp: ChangesResponse) -> Self {
        Self {
            folders: resp.folders,
            documents: resp.documents,
            cursor: resp.last_sync_at,
        }
    }
}

/// Response of `POST /api/documents/{id}/images/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Body of `POST /api/auth/sync-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

/// Response of `POST /api/auth/sync-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
