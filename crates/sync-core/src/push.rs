//! Push: local tree -> remote operations.
//!
//! A push runs in two phases. Phase one sends a single batch with every
//! folder (parents first) followed by every document, content as-is.
//! Phase two uploads the local images referenced by those documents (the
//! remote only accepts uploads for documents that already exist) and sends
//! one update per document with the image targets replaced by blob URLs.
//!
//! Phase one failing aborts the push. Phase two failures are per document:
//! they are logged and recorded in the report, and the next push retries
//! them because the local file still holds the local references.

use crate::cursor::{CursorError, CursorStore};
use crate::folders::{resolve_folder_ids, FolderIndex};
use crate::fs::{self, FileSystem, FsError};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::identity::derive_id;
use crate::images::{local_image_refs, replace_span, resolve_local_target};
use crate::model::{DocumentUpsert, FolderCreate, Operation};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Extension (lowercase, without the dot) of files synced as documents.
pub const DOCUMENT_EXTENSION: &str = "md";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Failed to walk sync root: {0}")]
    Walk(#[from] FsError),

    #[error("Failed to apply operations: {0}")]
    Apply(#[source] GatewayError),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

pub type Result<T> = std::result::Result<T, PushError>;

/// Outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Operations accepted by the remote (batch plus follow-up updates)
    pub operations: usize,
    pub folders: usize,
    pub documents: usize,
    pub images_uploaded: usize,
    /// Documents whose content was updated with blob URLs
    pub documents_rewritten: usize,
    /// Per-document problems that did not abort the push
    pub failures: Vec<String>,
}

/// The first-phase batch and the documents that need a second phase.
#[derive(Debug, Clone, Default)]
pub struct PushPlan {
    /// Folder creates sorted by path, then document creates
    pub operations: Vec<Operation>,
    /// Documents whose content references local images
    pub with_images: Vec<DocumentUpsert>,
}

/// Whether a root-relative path names a synced document.
pub fn is_document(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

/// Document title: the file name without its extension.
pub fn document_title(path: &str) -> String {
    let name = path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION) => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Walk the local tree and build the first-phase batch.
///
/// Folder ids come from `remote` when it already knows a folder at the
/// same path, and are derived from the path otherwise.
pub async fn plan_push<F: FileSystem + ?Sized>(
    fs: &F,
    remote_folders: &[crate::model::Folder],
) -> Result<PushPlan> {
    let entries = fs::walk(fs).await?;

    let folder_paths: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_dir)
        .map(|e| e.path.as_str())
        .collect();
    let index = resolve_folder_ids(folder_paths.iter().copied(), remote_folders);

    let mut folder_ops: Vec<Operation> = folder_paths
        .iter()
        .map(|path| Operation::FolderCreate(FolderCreate::at_path(derive_id(path), path)))
        .collect();
    folder_ops.sort_by(|a, b| a.path().cmp(b.path()));

    let mut plan = PushPlan {
        operations: folder_ops,
        with_images: Vec::new(),
    };

    for entry in entries.iter().filter(|e| !e.is_dir && is_document(&e.path)) {
        let Some(doc) = load_document(fs, &entry.path, &index).await else {
            continue;
        };
        if !local_image_refs(&doc.content).is_empty() {
            plan.with_images.push(doc.clone());
        }
        plan.operations.push(Operation::DocumentCreate(doc));
    }

    Ok(plan)
}

async fn load_document<F: FileSystem + ?Sized>(
    fs: &F,
    path: &str,
    index: &FolderIndex,
) -> Option<DocumentUpsert> {
    let bytes = match fs.read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Push: read {}: {}", path, e);
            return None;
        }
    };
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            warn!("Push: {} is not valid UTF-8: {}", path, e);
            return None;
        }
    };

    let dir = fs::parent_dir(path);
    let folder_id = if dir.is_empty() {
        None
    } else {
        index.id_for(dir).map(String::from)
    };

    Some(DocumentUpsert {
        id: derive_id(path),
        folder_id,
        title: document_title(path),
        content,
        relative_path: path.to_string(),
    })
}

/// Push the local tree to the remote.
pub async fn push<F, G, C>(fs: &F, gateway: &G, cursor: &mut C) -> Result<PushReport>
where
    F: FileSystem + ?Sized,
    G: RemoteGateway + ?Sized,
    C: CursorStore + ?Sized,
{
    let since = cursor.cursor();
    let remote_folders = match gateway.fetch_changes(since.as_deref()).await {
        Ok(changes) => changes.folders,
        Err(e) => {
            warn!("Push: could not fetch remote folders, using derived ids: {}", e);
            Vec::new()
        }
    };

    let plan = plan_push(fs, &remote_folders).await?;
    let mut report = PushReport {
        folders: plan.operations.iter().filter(|op| op.is_folder()).count(),
        documents: plan.operations.iter().filter(|op| !op.is_folder()).count(),
        ..PushReport::default()
    };

    if plan.operations.is_empty() {
        debug!("Push: nothing to send");
        return Ok(report);
    }

    let batch_cursor = gateway
        .apply_operations(&plan.operations)
        .await
        .map_err(PushError::Apply)?;
    cursor.advance(batch_cursor)?;
    report.operations = plan.operations.len();

    let mut latest = None;
    for doc in plan.with_images {
        let Some(updated) = upload_images(fs, gateway, &doc, &mut report).await else {
            continue;
        };
        match gateway
            .apply_operations(&[Operation::DocumentUpdate(updated)])
            .await
        {
            Ok(next) => {
                report.operations += 1;
                report.documents_rewritten += 1;
                latest = Some(next);
            }
            Err(e) => {
                warn!("Push: update {}: {}", doc.relative_path, e);
                report
                    .failures
                    .push(format!("update {}: {}", doc.relative_path, e));
            }
        }
    }
    if let Some(next) = latest {
        cursor.advance(next)?;
    }

    info!("Push complete ({} ops)", report.operations);
    Ok(report)
}

/// Upload every local image `doc` references and substitute blob URLs.
///
/// Returns the rewritten document, or `None` when nothing was substituted.
async fn upload_images<F, G>(
    fs: &F,
    gateway: &G,
    doc: &DocumentUpsert,
    report: &mut PushReport,
) -> Option<DocumentUpsert>
where
    F: FileSystem + ?Sized,
    G: RemoteGateway + ?Sized,
{
    let doc_dir = fs::parent_dir(&doc.relative_path);
    let mut content = doc.content.clone();
    let mut substituted = 0;

    for image in local_image_refs(&doc.content) {
        let Some(image_path) = resolve_local_target(doc_dir, image.target) else {
            warn!(
                "Push: image {} in {} is outside the sync root",
                image.target, doc.relative_path
            );
            report.failures.push(format!(
                "image {} in {}: outside sync root",
                image.target, doc.relative_path
            ));
            continue;
        };

        let bytes = match fs.read(&image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Push: image {}: {}", image.target, e);
                report
                    .failures
                    .push(format!("image {} in {}: {}", image.target, doc.relative_path, e));
                continue;
            }
        };

        let filename = image_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&image_path);
        let url = match gateway.upload_blob(&doc.id, filename, bytes).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Push: upload {}: {}", image.target, e);
                report
                    .failures
                    .push(format!("upload {} for {}: {}", image.target, doc.relative_path, e));
                continue;
            }
        };
        report.images_uploaded += 1;

        let (next, count) = replace_span(&content, image.span, &image.retarget(&url));
        content = next;
        substituted += count;
    }

    if substituted == 0 {
        return None;
    }
    Some(DocumentUpsert {
        content,
        ..doc.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryCursor;
    use crate::fs::InMemoryFs;
    use crate::memory::InMemoryGateway;
    use crate::model::Folder;

    async fn tree(files: &[(&str, &str)]) -> InMemoryFs {
        let fs = InMemoryFs::new();
        for (path, content) in files {
            fs.write(path, content.as_bytes()).await.unwrap();
        }
        fs
    }

    #[test]
    fn test_document_detection_and_title() {
        assert!(is_document("notes/readme.md"));
        assert!(is_document("NOTES.MD"));
        assert!(!is_document("photo.png"));
        assert!(!is_document("md"));
        assert_eq!(document_title("notes/readme.md"), "readme");
        assert_eq!(document_title("Upper.MD"), "Upper");
    }

    #[tokio::test]
    async fn test_push_creates_folders_and_documents() {
        let fs = tree(&[("notes/readme.md", "# Hello\n")]).await;
        let gateway = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();

        let report = push(&fs, &gateway, &mut cursor).await.unwrap();

        assert_eq!(report.folders, 1);
        assert_eq!(report.documents, 1);
        assert_eq!(report.operations, 2);
        assert_eq!(gateway.folder_paths(), vec!["notes"]);

        let doc = gateway.document(&derive_id("notes/readme.md")).unwrap();
        assert_eq!(doc.title, "readme");
        assert_eq!(doc.content, "# Hello\n");
        assert_eq!(doc.folder_id, Some(derive_id("notes")));
        assert_eq!(cursor.history.len(), 1);
    }

    #[tokio::test]
    async fn test_folder_creates_precede_children() {
        let fs = tree(&[
            ("z/a/b/deep.md", "x"),
            ("a b/file.md", "x"),
            ("a/b/c/file.md", "x"),
            ("a/file.md", "x"),
        ])
        .await;

        let plan = plan_push(&fs, &[]).await.unwrap();

        let position = |path: &str| {
            plan.operations
                .iter()
                .position(|op| op.is_folder() && op.path() == path)
        };
        for (i, op) in plan.operations.iter().enumerate() {
            if let Operation::FolderCreate(folder) = op {
                if let Some(parent) = &folder.parent_path {
                    let parent_index = position(parent).expect("parent folder is in the batch");
                    assert!(parent_index < i, "{} must precede {}", parent, folder.path);
                }
            }
        }
        let last_folder = plan.operations.iter().rposition(|op| op.is_folder()).unwrap();
        let first_doc = plan.operations.iter().position(|op| !op.is_folder()).unwrap();
        assert!(last_folder < first_doc);
    }

    #[tokio::test]
    async fn test_existing_remote_folder_ids_are_reused() {
        let fs = tree(&[("notes/readme.md", "x")]).await;
        let remote = vec![Folder {
            id: "server-notes".into(),
            parent_id: None,
            name: "notes".into(),
        }];

        let plan = plan_push(&fs, &remote).await.unwrap();

        let doc = plan
            .operations
            .iter()
            .find_map(|op| match op {
                Operation::DocumentCreate(doc) => Some(doc),
                _ => None,
            })
            .unwrap();
        assert_eq!(doc.folder_id.as_deref(), Some("server-notes"));
    }

    #[tokio::test]
    async fn test_empty_tree_sends_nothing() {
        let fs = InMemoryFs::new();
        let gateway = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();

        let report = push(&fs, &gateway, &mut cursor).await.unwrap();

        assert_eq!(report, PushReport::default());
        assert!(gateway.apply_calls().is_empty());
        assert!(cursor.history.is_empty());
    }

    #[tokio::test]
    async fn test_image_lifecycle() {
        let fs = tree(&[("doc.md", "# Doc\n![img](./photo.png)\n")]).await;
        fs.write("photo.png", b"fake-png").await.unwrap();
        let gateway = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();

        let report = push(&fs, &gateway, &mut cursor).await.unwrap();

        let calls = gateway.apply_calls();
        assert_eq!(calls.len(), 2);
        match &calls[0][0] {
            Operation::DocumentCreate(doc) => {
                assert_eq!(doc.content, "# Doc\n![img](./photo.png)\n")
            }
            other => panic!("expected document create, got {:?}", other),
        }

        let uploads = gateway.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].owner_id, derive_id("doc.md"));
        assert_eq!(uploads[0].filename, "photo.png");
        assert_eq!(uploads[0].bytes, b"fake-png");

        let expected = format!("# Doc\n![img]({})\n", uploads[0].url);
        match &calls[1][..] {
            [Operation::DocumentUpdate(doc)] => assert_eq!(doc.content, expected),
            other => panic!("expected one document update, got {:?}", other),
        }
        assert_eq!(gateway.document(&derive_id("doc.md")).unwrap().content, expected);
        assert_eq!(report.images_uploaded, 1);
        assert_eq!(report.documents_rewritten, 1);
        assert_eq!(cursor.history.len(), 2);

        // The local file keeps its local reference
        assert_eq!(fs.read("doc.md").await.unwrap(), b"# Doc\n![img](./photo.png)\n");
    }

    #[tokio::test]
    async fn test_batch_failure_aborts_push() {
        let fs = tree(&[("doc.md", "![i](a.png)")]).await;
        fs.write("a.png", b"png").await.unwrap();
        let gateway = InMemoryGateway::new();
        gateway.set_fail_apply(true);
        let mut cursor = MemoryCursor::starting_at("rev-0");

        let err = push(&fs, &gateway, &mut cursor).await.unwrap_err();

        assert!(matches!(err, PushError::Apply(_)));
        assert!(gateway.uploads().is_empty());
        assert_eq!(cursor.cursor().as_deref(), Some("rev-0"));
    }

    #[tokio::test]
    async fn test_one_documents_image_failure_does_not_block_others() {
        let fs = tree(&[
            ("broken.md", "![gone](missing.png)"),
            ("ok.md", "![fine](a.png)"),
        ])
        .await;
        fs.write("a.png", b"png").await.unwrap();
        let gateway = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();

        let report = push(&fs, &gateway, &mut cursor).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("missing.png"));
        assert_eq!(report.documents_rewritten, 1);
        let ok = gateway.document(&derive_id("ok.md")).unwrap();
        assert!(ok.content.starts_with("![fine](https://"));
        let broken = gateway.document(&derive_id("broken.md")).unwrap();
        assert_eq!(broken.content, "![gone](missing.png)");
    }

    #[tokio::test]
    async fn test_interrupted_image_phase_converges_on_retry() {
        let fs = tree(&[("notes/doc.md", "see ![p](../img/p.png)")]).await;
        fs.write("img/p.png", b"png").await.unwrap();
        let gateway = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();
        let id = derive_id("notes/doc.md");

        // First attempt: the batch lands, uploads fail
        gateway.set_fail_uploads(true);
        let first = push(&fs, &gateway, &mut cursor).await.unwrap();
        assert_eq!(first.failures.len(), 1);
        assert_eq!(gateway.document(&id).unwrap().content, "see ![p](../img/p.png)");

        // Second attempt: same ids, the document converges to the blob URL
        gateway.set_fail_uploads(false);
        let second = push(&fs, &gateway, &mut cursor).await.unwrap();
        assert!(second.failures.is_empty());
        let url = gateway.uploads()[0].url.clone();
        assert_eq!(gateway.document(&id).unwrap().content, format!("see ![p]({})", url));
        assert_eq!(gateway.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_is_reported_not_fatal() {
        let fs = tree(&[("doc.md", "![i](a.png)")]).await;
        fs.write("a.png", b"png").await.unwrap();
        let gateway = InMemoryGateway::new();
        gateway.set_fail_updates(true);
        let mut cursor = MemoryCursor::new();

        let report = push(&fs, &gateway, &mut cursor).await.unwrap();

        assert_eq!(report.images_uploaded, 1);
        assert_eq!(report.documents_rewritten, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(cursor.history.len(), 1);
    }

    #[tokio::test]
    async fn test_push_is_idempotent() {
        let files = [
            ("notes/readme.md", "# Hello"),
            ("notes/sub/deep.md", "deep"),
            ("top.md", "top"),
        ];
        let fs = tree(&files).await;

        let once = InMemoryGateway::new();
        push(&fs, &once, &mut MemoryCursor::new()).await.unwrap();

        let twice = InMemoryGateway::new();
        let mut cursor = MemoryCursor::new();
        push(&fs, &twice, &mut cursor).await.unwrap();
        push(&fs, &twice, &mut cursor).await.unwrap();

        assert_eq!(once.folders(), twice.folders());
        assert_eq!(once.documents(), twice.documents());

        // Replaying the second run's batch on a fresh store gives the same result
        let replay = InMemoryGateway::new();
        for batch in &twice.apply_calls()[1..] {
            replay.apply_operations(batch).await.unwrap();
        }
        assert_eq!(replay.folders(), once.folders());
        assert_eq!(replay.documents(), once.documents());
    }
}
