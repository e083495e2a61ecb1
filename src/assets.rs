//! Static asset pipeline.
//!
//! Classifies files in the assets directory: small images become `data:`
//! URIs inlined straight into the generated HTML, everything else is copied
//! into the output tree under the static directory. Production references
//! carry a content-hash query for cache busting.

use crate::config::{AppConfig, Mode};
use crate::utils::hash::content_hash;
use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::{fs, path::Path};
use walkdir::WalkDir;

/// How one asset is referenced from generated HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// Base64 data URI, embedded directly
    Inline(String),
    /// Href pointing at the copied file in the static directory
    Static { href: String },
}

/// Mapping from the root-relative asset path (as written in the template,
/// e.g. `assets/logo.png`) to its reference. Kept sorted for deterministic
/// rewriting.
#[derive(Debug, Clone, Default)]
pub struct AssetMap {
    entries: Vec<(String, AssetRef)>,
}

impl AssetMap {
    pub fn iter(&self) -> impl Iterator<Item = &(String, AssetRef)> {
        self.entries.iter()
    }
}

#[cfg(test)]
impl AssetMap {
    pub fn from_entries(entries: Vec<(String, AssetRef)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AssetRef> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }
}

/// Image extensions eligible for data-URI inlining
const INLINE_EXTS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
];

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    INLINE_EXTS.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

/// Process the assets directory and return the reference map.
///
/// A missing directory is a no-op; read failures on individual files abort
/// the build.
pub fn process_assets(config: &AppConfig, mode: Mode) -> Result<AssetMap> {
    let assets_dir = &config.assets.dir;
    let mut map = AssetMap::default();

    if !assets_dir.is_dir() {
        return Ok(map);
    }

    let root = config.get_root();
    let threshold = config.get_inline_max_size();
    let static_out = config.build.output.join(&config.assets.static_dir);

    for entry in WalkDir::new(assets_dir).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("Failed to scan assets directory {}", assets_dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        // Key as the template would reference it: relative to the project root
        let key = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        let rel = path.strip_prefix(assets_dir).unwrap_or(path);

        let size = entry.metadata().map(|m| m.len() as usize).unwrap_or(usize::MAX);
        let asset_ref = match image_mime(path) {
            Some(mime) if size <= threshold => inline_asset(path, mime)?,
            _ => copy_asset(path, rel, &static_out, config, mode)?,
        };

        map.entries.push((key, asset_ref));
    }

    Ok(map)
}

/// Read and embed a small image as a data URI.
fn inline_asset(path: &Path, mime: &str) -> Result<AssetRef> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read asset {}", path.display()))?;
    Ok(AssetRef::Inline(format!("data:{mime};base64,{}", STANDARD.encode(bytes))))
}

/// Copy an asset into the static output directory and compute its href.
fn copy_asset(
    path: &Path,
    rel: &Path,
    static_out: &Path,
    config: &AppConfig,
    mode: Mode,
) -> Result<AssetRef> {
    let dest = static_out.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(path, &dest)
        .with_context(|| format!("Failed to copy asset {}", path.display()))?;

    let rel_href = format!("{}/{}", config.assets.static_dir.display(), rel.display());
    let mut href = config.public_href(&rel_href);

    // Cache-busting query in production; the file itself keeps its name
    if mode.is_production() {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read asset {}", path.display()))?;
        href.push('?');
        href.push_str(&content_hash(&bytes));
    }

    Ok(AssetRef::Static { href })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_at(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.build.root = Some(root.to_path_buf());
        config.assets.dir = root.join("assets");
        config.build.output = root.join("dist");
        config
    }

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_missing_assets_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let map = process_assets(&config_at(tmp.path()), Mode::Development).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_small_image_is_inlined() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "assets/logo.png", b"\x89PNG tiny");

        let map = process_assets(&config_at(tmp.path()), Mode::Development).unwrap();

        match map.get("assets/logo.png").unwrap() {
            AssetRef::Inline(uri) => {
                assert!(uri.starts_with("data:image/png;base64,"));
            }
            other => panic!("expected inline asset, got {other:?}"),
        }
        // Inlined assets are not copied
        assert!(!tmp.path().join("dist/static/logo.png").exists());
    }

    #[test]
    fn test_large_image_is_copied() {
        let tmp = TempDir::new().unwrap();
        let config = {
            let mut c = config_at(tmp.path());
            c.assets.inline_max_size = "10B".into();
            c
        };
        write(tmp.path(), "assets/photo.jpg", &[0u8; 64]);

        let map = process_assets(&config, Mode::Development).unwrap();

        match map.get("assets/photo.jpg").unwrap() {
            AssetRef::Static { href } => assert_eq!(href, "/static/photo.jpg"),
            other => panic!("expected static asset, got {other:?}"),
        }
        assert!(tmp.path().join("dist/static/photo.jpg").exists());
    }

    #[test]
    fn test_non_image_is_copied_with_layout() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "assets/fonts/site.woff2", b"woff2 bytes");

        let map = process_assets(&config_at(tmp.path()), Mode::Development).unwrap();

        match map.get("assets/fonts/site.woff2").unwrap() {
            AssetRef::Static { href } => assert_eq!(href, "/static/fonts/site.woff2"),
            other => panic!("expected static asset, got {other:?}"),
        }
        assert!(tmp.path().join("dist/static/fonts/site.woff2").exists());
    }

    #[test]
    fn test_production_href_carries_hash_query() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "assets/app.css", b"body{}");

        let dev = process_assets(&config_at(tmp.path()), Mode::Development).unwrap();
        let prod = process_assets(&config_at(tmp.path()), Mode::Production).unwrap();

        let AssetRef::Static { href: dev_href } = dev.get("assets/app.css").unwrap() else {
            panic!("expected static asset")
        };
        let AssetRef::Static { href: prod_href } = prod.get("assets/app.css").unwrap() else {
            panic!("expected static asset")
        };

        assert!(!dev_href.contains('?'));
        let (base, query) = prod_href.split_once('?').unwrap();
        assert_eq!(base, dev_href);
        assert_eq!(query.len(), 8);
        assert!(query.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
