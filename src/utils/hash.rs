//! Content hashing for cache-busting output names.
//!
//! Production bundles are keyed by a digest of their contents so that
//! unchanged files keep their URL across deploys.

use std::{fs, path::Path};

use anyhow::{Context, Result};

/// Number of hex characters kept from the digest.
///
/// Eight characters (32 bits) is plenty for per-project uniqueness and keeps
/// filenames readable.
const HASH_LEN: usize = 8;

/// Short hex digest of a byte slice.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    let mut hex = hex::encode(digest.as_bytes());
    hex.truncate(HASH_LEN);
    hex
}

/// Short hex digest of a file's contents.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(content_hash(&bytes))
}

/// Build a content-hashed filename: `home` + `js` + digest → `home.3a7f90c1.js`.
pub fn hashed_name(stem: &str, ext: &str, hash: &str) -> String {
    format!("{stem}.{hash}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_short_hex() {
        let hash = content_hash(b"console.log('hi')");
        assert_eq!(hash.len(), HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(content_hash(b"same input"), content_hash(b"same input"));
        assert_ne!(content_hash(b"input a"), content_hash(b"input b"));
    }

    #[test]
    fn test_hashed_name() {
        assert_eq!(hashed_name("home", "js", "3a7f90c1"), "home.3a7f90c1.js");
        assert_eq!(hashed_name("about", "css", "deadbeef"), "about.deadbeef.css");
    }

    #[test]
    fn test_file_hash_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.js");
        fs::write(&path, b"alert(1)").unwrap();

        assert_eq!(file_hash(&path).unwrap(), content_hash(b"alert(1)"));
    }

    #[test]
    fn test_file_hash_missing_file() {
        assert!(file_hash(Path::new("/nonexistent/bundle.js")).is_err());
    }
}
