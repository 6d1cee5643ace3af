//! Pull: remote changes -> local tree.
//!
//! Folders are materialised first, then each changed document is written
//! at its relative path. Images hosted on the blob store are downloaded
//! next to the document and their references rewritten to the bare file
//! name. Local files are overwritten unconditionally.

use crate::cursor::{CursorError, CursorStore};
use crate::folders::FolderIndex;
use crate::fs::{self, FileSystem};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::images::{blob_file_name, image_refs, replace_span, BlobHost, ImageRef};
use crate::model::Document;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PullError {
    #[error("Failed to fetch changes: {0}")]
    Fetch(#[source] GatewayError),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

pub type Result<T> = std::result::Result<T, PullError>;

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Images on this host are downloaded and referenced locally
    pub blob_host: BlobHost,
}

/// Outcome of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub folders_created: usize,
    pub documents_written: usize,
    pub images_downloaded: usize,
    /// Folders and documents ignored because their path could not be
    /// resolved or would leave the sync root
    pub skipped: usize,
    /// Per-item problems that did not abort the pull
    pub failures: Vec<String>,
}

/// Normalise a remote-supplied relative path. Absolute paths, drive
/// prefixes and `.`/`..` segments are rejected.
pub fn safe_relative_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.starts_with('/') || path.starts_with('\\') {
        return None;
    }

    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" => {}
            "." | ".." => return None,
            s if s.contains(':') => return None,
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Fetch remote changes since the stored cursor and apply them locally.
pub async fn pull<F, G, C>(
    fs: &F,
    gateway: &G,
    cursor: &mut C,
    options: &PullOptions,
) -> Result<PullReport>
where
    F: FileSystem + ?Sized,
    G: RemoteGateway + ?Sized,
    C: CursorStore + ?Sized,
{
    let since = cursor.cursor();
    let changes = gateway
        .fetch_changes(since.as_deref())
        .await
        .map_err(PullError::Fetch)?;
    debug!(
        "Pull: {} folder(s), {} document(s) since {:?}",
        changes.folders.len(),
        changes.documents.len(),
        since
    );

    let mut report = PullReport::default();

    let mut index = FolderIndex::new();
    let unplaced = index.place(&changes.folders);
    report.skipped += unplaced.len();

    let mut folder_paths: Vec<&str> = index.paths().collect();
    folder_paths.sort();
    for path in folder_paths {
        let Some(path) = safe_relative_path(path) else {
            warn!("Pull: skipping folder with unsafe path {:?}", path);
            report.skipped += 1;
            continue;
        };
        match fs.mkdir(&path).await {
            Ok(()) => report.folders_created += 1,
            Err(e) => {
                warn!("Pull: mkdir {}: {}", path, e);
                report.failures.push(format!("mkdir {}: {}", path, e));
            }
        }
    }

    for doc in &changes.documents {
        write_document(fs, gateway, options, doc, &mut report).await;
    }

    if !changes.cursor.is_empty() {
        cursor.advance(changes.cursor)?;
    }

    info!(
        "Pull complete ({} folders, {} documents)",
        report.folders_created, report.documents_written
    );
    Ok(report)
}

async fn write_document<F, G>(
    fs: &F,
    gateway: &G,
    options: &PullOptions,
    doc: &Document,
    report: &mut PullReport,
) where
    F: FileSystem + ?Sized,
    G: RemoteGateway + ?Sized,
{
    let Some(path) = safe_relative_path(&doc.relative_path) else {
        warn!(
            "Pull: skipping document {} with unsafe path {:?}",
            doc.id, doc.relative_path
        );
        report.skipped += 1;
        return;
    };

    let dir = fs::parent_dir(&path);
    if !dir.is_empty() {
        if let Err(e) = fs.mkdir(dir).await {
            warn!("Pull: mkdir {}: {}", dir, e);
            report.failures.push(format!("mkdir {}: {}", dir, e));
            return;
        }
    }

    let content = localize_images(fs, gateway, &options.blob_host, dir, &doc.content, report).await;

    match fs.write(&path, content.as_bytes()).await {
        Ok(()) => report.documents_written += 1,
        Err(e) => {
            warn!("Pull: write {}: {}", path, e);
            report.failures.push(format!("write {}: {}", path, e));
        }
    }
}

/// Download blob-hosted images into `dir` and point their references at
/// the local copies. References that fail to download are left as-is.
async fn localize_images<F, G>(
    fs: &F,
    gateway: &G,
    blob_host: &BlobHost,
    dir: &str,
    content: &str,
    report: &mut PullReport,
) -> String
where
    F: FileSystem + ?Sized,
    G: RemoteGateway + ?Sized,
{
    let mut hosted: Vec<ImageRef<'_>> = Vec::new();
    for image in image_refs(content) {
        if blob_host.matches(image.target) && !hosted.iter().any(|r| r.span == image.span) {
            hosted.push(image);
        }
    }

    let mut localized = content.to_string();
    for image in hosted {
        let filename = blob_file_name(image.target);
        let local_path = fs::join(dir, &filename);

        let bytes = match gateway.download_blob(image.target.trim()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Pull: download {}: {}", image.target, e);
                report
                    .failures
                    .push(format!("download {}: {}", image.target, e));
                continue;
            }
        };
        if let Err(e) = fs.write(&local_path, &bytes).await {
            warn!("Pull: write {}: {}", local_path, e);
            report.failures.push(format!("write {}: {}", local_path, e));
            continue;
        }
        report.images_downloaded += 1;

        let (next, _) = replace_span(&localized, image.span, &image.retarget(&filename));
        localized = next;
    }
    localized
}
