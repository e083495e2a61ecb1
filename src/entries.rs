//! Page entry discovery and output derivation.
//!
//! Scans the pages directory for entry scripts and derives, per page, the
//! bundler entry and the HTML output directive. This is the single source of
//! truth for what gets built: one script in, one bundle and one HTML file
//! out, with the page name (the script's base name without extension) tying
//! the two together.
//!
//! Derivation is a pure function of the directory contents: it is evaluated
//! once per build, is identical between development and production, and the
//! listing is sorted so results do not depend on filesystem enumeration
//! order.

use crate::{config::{AppConfig, CollisionPolicy}, log};
use anyhow::{Context, Result, bail};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One buildable page: a name and the script that is its bundler entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    /// Page name: script base name with the extension stripped.
    /// Doubles as the entry key and the output HTML base name.
    pub name: String,
    /// Path to the entry script
    pub script: PathBuf,
}

/// Instruction for generating one HTML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDirective {
    /// Output file name, `<page>.html`
    pub filename: String,
    /// Shared template every page is generated from
    pub template: PathBuf,
    /// Page names whose chunks this file includes (always exactly its own)
    pub chunks: Vec<String>,
}

/// The derived build surface: entries and their HTML directives, in
/// discovery order and of equal length.
#[derive(Debug, Clone, Default)]
pub struct PageSet {
    pub entries: Vec<PageEntry>,
    pub directives: Vec<HtmlDirective>,
}

impl PageSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Derive the page set from the configured pages directory.
///
/// A missing directory or one with no matching scripts yields an empty set;
/// only actual read failures (permissions and the like) are errors and abort
/// the build before any bundling starts.
pub fn derive_pages(config: &AppConfig) -> Result<PageSet> {
    scan(
        &config.pages.dir,
        &config.pages.extensions,
        config.pages.recursive,
        config.pages.on_collision,
        &config.pages.template,
    )
}

/// Scan `dir` for scripts matching `extensions` and derive the page set.
fn scan(
    dir: &Path,
    extensions: &[String],
    recursive: bool,
    on_collision: CollisionPolicy,
    template: &Path,
) -> Result<PageSet> {
    let mut set = PageSet::default();

    if !dir.is_dir() {
        return Ok(set);
    }

    let depth = if recursive { usize::MAX } else { 1 };
    // Sorted traversal keeps discovery order stable across platforms
    let walker = WalkDir::new(dir).max_depth(depth).sort_by_file_name();

    // Page name → index into `set.entries`, for collision detection
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();

    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to scan pages directory {}", dir.display()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || !matches_extension(path, extensions) {
            continue;
        }

        let Some(name) = page_name(path) else {
            continue;
        };

        if let Some(&index) = seen.get(&name) {
            match on_collision {
                CollisionPolicy::Error => bail!(
                    "Duplicate page name `{}`: {} and {}",
                    name,
                    set.entries[index].script.display(),
                    path.display(),
                ),
                CollisionPolicy::Warn => {
                    log!("warn"; "duplicate page name `{}`, {} overrides {}",
                        name, path.display(), set.entries[index].script.display());
                    // Last-discovered script wins; the directive is unchanged
                    set.entries[index].script = path.to_path_buf();
                }
            }
            continue;
        }

        seen.insert(name.clone(), set.entries.len());
        set.directives.push(HtmlDirective {
            filename: format!("{name}.html"),
            template: template.to_path_buf(),
            chunks: vec![name.clone()],
        });
        set.entries.push(PageEntry { name, script: path.to_path_buf() });
    }

    Ok(set)
}

/// Page name: base name with the extension stripped.
fn page_name(path: &Path) -> Option<String> {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}
