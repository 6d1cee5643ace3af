//! sync-core: Shared Rust library for mirroring a local folder of markdown
//! documents with a remote document store.
//!
//! This crate provides the core functionality for:
//! - Deterministic ids derived from root-relative paths
//! - Resolving the remote folder hierarchy into paths
//! - Finding, uploading and localising embedded image references
//! - Push (local -> remote) and pull (remote -> local) reconcilers
//! - FileSystem, RemoteGateway and CursorStore trait abstractions

pub mod cursor;
pub mod folders;
pub mod fs;
pub mod gateway;
pub mod identity;
pub mod images;
pub mod memory;
pub mod model;
pub mod protocol;
pub mod pull;
pub mod push;

pub use cursor::{CursorError, CursorStore, MemoryCursor};
pub use folders::{resolve_folder_ids, FolderIndex};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs, TreeEntry};
pub use gateway::{GatewayError, RemoteGateway};
pub use identity::derive_id;
pub use images::BlobHost;
pub use memory::InMemoryGateway;
pub use model::{ChangeSet, Document, DocumentUpsert, Folder, FolderCreate, Operation};
pub use pull::{pull, PullError, PullOptions, PullReport};
pub use push::{push, PushError, PushReport};
