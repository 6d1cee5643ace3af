//! Image references embedded in document content.
//!
//! Images are written as `![alt](target)`. A target is *local* when it is
//! a path relative to the document (uploaded on push) and *remote* when it
//! is an http(s) URL. Remote targets on the blob host are downloaded on
//! pull and replaced by a bare file name.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static IMAGE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("image reference pattern is valid")
});

/// Default host of the blob store that serves uploaded images.
pub const DEFAULT_BLOB_HOST: &str = "blob.vercel-storage.com";

/// File name used when a blob URL has no usable last segment.
const FALLBACK_FILE_NAME: &str = "image";

/// One `![alt](target)` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef<'a> {
    /// The whole `![alt](target)` span as written
    pub span: &'a str,
    pub alt: &'a str,
    pub target: &'a str,
}

impl ImageRef<'_> {
    pub fn is_local(&self) -> bool {
        is_local_target(self.target)
    }

    /// The same reference pointing at `target`.
    pub fn retarget(&self, target: &str) -> String {
        format!("![{}]({})", self.alt, target)
    }
}

/// All image references in `content`, in order of appearance.
pub fn image_refs(content: &str) -> Vec<ImageRef<'_>> {
    IMAGE_REF
        .captures_iter(content)
        .filter_map(|caps| {
            Some(ImageRef {
                span: caps.get(0)?.as_str(),
                alt: caps.get(1)?.as_str(),
                target: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Image references that point at local files, deduplicated by span.
pub fn local_image_refs(content: &str) -> Vec<ImageRef<'_>> {
    let mut refs: Vec<ImageRef<'_>> = Vec::new();
    for image in image_refs(content) {
        if image.is_local() && !refs.iter().any(|r| r.span == image.span) {
            refs.push(image);
        }
    }
    refs
}

/// Whether a target names a local file rather than a URL.
pub fn is_local_target(target: &str) -> bool {
    let target = target.trim();
    !target.is_empty() && !target.starts_with("http://") && !target.starts_with("https://")
}

/// Replace every literal occurrence of `span` with `replacement`.
///
/// Returns the new content and how many occurrences were replaced.
pub fn replace_span(content: &str, span: &str, replacement: &str) -> (String, usize) {
    let count = content.matches(span).count();
    if count == 0 {
        return (content.to_string(), 0);
    }
    (content.replace(span, replacement), count)
}

/// Resolve a local image target against the root-relative directory of
/// the document that references it.
///
/// Handles `./` and `../` segments and percent-encoded characters.
/// Returns `None` when the result would leave the sync root.
pub fn resolve_local_target(doc_dir: &str, target: &str) -> Option<String> {
    let target = target.trim();
    let decoded = urlencoding::decode(target)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| target.to_string());

    let mut segments: Vec<&str> = doc_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Matches URLs served by the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHost(String);

impl BlobHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into().trim().trim_start_matches('.').to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `target` is an http(s) URL on this host or one of its
    /// subdomains.
    pub fn matches(&self, target: &str) -> bool {
        let Ok(url) = Url::parse(target.trim()) else {
            return false;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                host == self.0 || host.ends_with(&format!(".{}", self.0))
            }
            None => false,
        }
    }
}

impl Default for BlobHost {
    fn default() -> Self {
        Self::new(DEFAULT_BLOB_HOST)
    }
}

/// Local file name for a downloaded blob: the URL's last path segment.
pub fn blob_file_name(target: &str) -> String {
    let segment = Url::parse(target.trim())
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);
    let name: String = decoded
        .chars()
        .filter(|c| *c != '/' && *c != '\\')
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        name
    }
}
