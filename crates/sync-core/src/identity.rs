//! Deterministic identities for folders and documents.
//!
//! The remote store keys everything by UUID. Rather than keep a local
//! index of which UUID belongs to which file, we derive the UUID from the
//! root-relative path: the same path always maps to the same id, so a
//! repeated push is recognised by the remote as an update of what it
//! already has.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive the stable identifier for a root-relative, forward-slash path.
///
/// The first 16 bytes of the SHA-256 digest are formatted as a hyphenated
/// UUID (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`). No version or variant
/// bits are set; the remote only requires the textual shape.
pub fn derive_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_id_is_deterministic() {
        assert_eq!(derive_id("notes/readme.md"), derive_id("notes/readme.md"));
    }

    #[test]
    fn test_derive_id_has_uuid_shape() {
        let id = derive_id("notes/readme.md");
        assert_eq!(id.len(), 36);
        let groups: Vec<_> = id.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert!(id.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derive_id_matches_digest_prefix() {
        // sha256("") = e3b0c442 98fc 1c14 9afb f4c8996fb924...
        assert_eq!(derive_id(""), "e3b0c442-98fc-1c14-9afb-f4c8996fb924");
    }

    #[test]
    fn test_distinct_paths_get_distinct_ids() {
        let paths = [
            "a",
            "b",
            "a/b",
            "a/b.md",
            "A/b.md",
            "notes",
            "notes/readme.md",
            "notes/Readme.md",
            "notes/sub/readme.md",
            "readme.md",
            "other/path.md",
        ];
        let ids: HashSet<_> = paths.iter().map(|p| derive_id(p)).collect();
        assert_eq!(ids.len(), paths.len());
    }
}
