//! RemoteGateway trait: the only way the reconcilers talk to the remote store.
//!
//! Implementations:
//! - `InMemoryGateway` - For testing
//! - `HttpGateway` (in sync-daemon) - Uses reqwest

use crate::model::{ChangeSet, Operation};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Access to the remote document store.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Folders and documents changed since `cursor` (everything when `None`).
    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeSet>;

    /// Apply a batch of operations in order. Returns the new cursor.
    async fn apply_operations(&self, operations: &[Operation]) -> Result<String>;

    /// Upload image bytes owned by a document. Returns the blob URL.
    async fn upload_blob(&self, owner_id: &str, filename: &str, bytes: Vec<u8>) -> Result<String>;

    /// Download the bytes behind a blob URL.
    async fn download_blob(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: RemoteGateway + ?Sized> RemoteGateway for std::sync::Arc<T> {
    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeSet> {
        (**self).fetch_changes(cursor).await
    }

    async fn apply_operations(&self, operations: &[Operation]) -> Result<String> {
        (**self).apply_operations(operations).await
    }

    async fn upload_blob(&self, owner_id: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        (**self).upload_blob(owner_id, filename, bytes).await
    }

    async fn download_blob(&self, url: &str) -> Result<Vec<u8>> {
        (**self).download_blob(url).await
    }
}
