//! File system watcher for rebuild-on-change.
//!
//! Monitors the pages directory, shared template, assets directory, and the
//! config file. Page script changes rebuild only the affected entries;
//! template and config changes trigger a full rebuild; asset changes re-run
//! the asset pipeline. Every successful rebuild is followed by a live-reload
//! broadcast to connected browsers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  ┌──────────────────┐  │  │
//! │                                  │  │ Full Rebuild     │  │  │
//! │                                  │  │ (template/config)│  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  │  ┌──────────────────┐  │  │
//! │                                  │  │ Incremental      │  │  │
//! │                                  │  │ (pages/assets)   │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    build,
    config::{AppConfig, Mode},
    log,
    reload::ReloadHandle,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path as relative to root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Change Categories
// =============================================================================

/// What a changed path means for the rebuild strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileCategory {
    /// A page entry script: rebuild only that entry
    Page,
    /// The shared template: full rebuild
    Template,
    /// The config file: full rebuild
    Config,
    /// A static asset: re-run the asset pipeline
    Asset,
    /// Anything else (stray files inside watched dirs)
    Unknown,
}

fn categorize_path(path: &Path, config: &AppConfig) -> FileCategory {
    if path == config.pages.template {
        FileCategory::Template
    } else if path == config.config_path {
        FileCategory::Config
    } else if path.starts_with(&config.pages.dir) {
        FileCategory::Page
    } else if path.starts_with(&config.assets.dir) {
        FileCategory::Asset
    } else {
        FileCategory::Unknown
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Attempt a full rebuild, logging errors on failure.
/// Returns true if successful (for cooldown tracking).
fn try_full_rebuild(config: &AppConfig, mode: Mode, reason: &str) -> bool {
    log!("watch"; "{reason}");

    match build::build_site(config, mode) {
        Ok(()) => true,
        Err(e) => {
            log!("watch"; "full rebuild failed");
            log!("watch"; "{e:#}");
            false
        }
    }
}

/// Process file changes. Returns true if a full rebuild succeeded (for
/// cooldown); incremental rebuilds are cheap enough to skip the cooldown.
fn handle_changes(
    paths: &[PathBuf],
    config: &AppConfig,
    mode: Mode,
    reload: &ReloadHandle,
) -> bool {
    if paths.is_empty() {
        return false;
    }

    let root = config.get_root();
    let rel = |p: &Path| rel_path(p, root);

    let mut full_rebuild_trigger: Option<&PathBuf> = None;
    let mut page_targets: Vec<PathBuf> = Vec::new();
    let mut assets_changed = false;

    for path in paths {
        match categorize_path(path, config) {
            FileCategory::Template | FileCategory::Config => {
                full_rebuild_trigger = Some(path);
            }
            FileCategory::Page => page_targets.push(path.clone()),
            FileCategory::Asset => assets_changed = true,
            FileCategory::Unknown => {}
        }
    }

    // Template/config changes invalidate everything
    if let Some(trigger) = full_rebuild_trigger {
        let ok = try_full_rebuild(config, mode, &format!("{} changed, rebuilding...", rel(trigger)));
        if ok {
            reload.broadcast();
        }
        return ok;
    }

    let mut reloaded = false;

    if !page_targets.is_empty() {
        match build::rebuild_entries(config, mode, &page_targets) {
            Ok(0) => {
                // A page script may have been created or renamed; the page
                // set itself changed, so fall back to a full build
                reloaded = try_full_rebuild(config, mode, "page set changed, rebuilding...");
            }
            Ok(count) => {
                log!("watch"; "rebuilt {} page(s)", count);
                reloaded = true;
            }
            Err(e) => {
                let context =
                    page_targets.iter().map(|p| rel(p)).collect::<Vec<_>>().join(", ");
                log!("watch"; "build failed ({context})");
                log!("watch"; "{e:#}");
            }
        }
    }

    if assets_changed {
        match build::rebuild_assets(config, mode) {
            Ok(()) => {
                log!("watch"; "assets refreshed");
                reloaded = true;
            }
            Err(e) => {
                log!("watch"; "asset rebuild failed");
                log!("watch"; "{e:#}");
            }
        }
    }

    if reloaded {
        reload.broadcast();
    }

    false
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, config: &AppConfig) -> Result<()> {
    let watch_targets: [(&Path, RecursiveMode); 4] = [
        (&config.pages.dir, RecursiveMode::Recursive),
        (&config.assets.dir, RecursiveMode::Recursive),
        (&config.pages.template, RecursiveMode::NonRecursive),
        (&config.config_path, RecursiveMode::NonRecursive),
    ];

    let root = config.get_root();
    let mut watched = Vec::new();

    for (path, mode) in watch_targets {
        if !path.exists() {
            continue;
        }
        watcher
            .watch(path, mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        watched.push(rel_path(path, root));
    }

    if !watched.is_empty() {
        log!("watch"; "watching: {}", watched.join(", "));
    }
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(
    config: &AppConfig,
    mode: Mode,
    reload: &ReloadHandle,
) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, config)?;

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                if handle_changes(&debouncer.take(), config, mode, reload) {
                    debouncer.mark_rebuild();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}
