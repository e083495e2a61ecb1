//! Build orchestration.
//!
//! Coordinates the whole pipeline for one build invocation:
//!
//! ```text
//! build_site()
//!     │
//!     ├── read_template()      shared template, fatal when unreadable
//!     ├── prepare_output()     clean + recreate (production, or --clean)
//!     ├── derive_pages()       pages dir → entries + HTML directives
//!     ├── bundle entries       external bundler, one invocation per page
//!     ├── finalize_entries()   settle bundle names (hashed in production)
//!     ├── process_assets()     inline-or-copy static assets
//!     └── render pages         write one HTML file per directive
//! ```
//!
//! Derivation happens exactly once per invocation; nothing is recomputed
//! mid-build.

use crate::{
    assets::{self, AssetMap},
    bundler::{self, SCRIPT_DIR, STYLE_DIR},
    config::{AppConfig, Mode},
    entries::{self, PageSet},
    html::{self, ChunkManifest, PageChunks},
    log,
    utils::hash,
};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Build every page, then the assets and HTML outputs.
pub fn build_site(config: &AppConfig, mode: Mode) -> Result<()> {
    // The template must be readable before any bundling starts
    read_template(&config.pages.template)?;
    prepare_output(config, mode)?;

    let pages = entries::derive_pages(config)?;
    if pages.is_empty() {
        log!("warn"; "no page scripts found in {}", config.pages.dir.display());
    } else {
        log!("build"; "{} build, {} page(s)", mode, pages.len());
    }

    pages
        .entries
        .par_iter()
        .try_for_each(|entry| bundler::bundle_entry(entry, config, mode))?;

    let manifest = finalize_entries(config, &pages, mode)?;
    let asset_map = assets::process_assets(config, mode)?;
    render_pages(&pages, &manifest, &asset_map, config, mode)?;

    log_build_result(&config.build.output)
}

/// Rebuild only the entries whose scripts changed, and their HTML.
///
/// Used by the watcher; a change to the template or config goes through
/// [`build_site`] instead. Returns the number of rebuilt pages.
pub fn rebuild_entries(config: &AppConfig, mode: Mode, changed: &[PathBuf]) -> Result<usize> {
    let pages = entries::derive_pages(config)?;
    let changed: Vec<PathBuf> =
        changed.iter().filter_map(|p| fs::canonicalize(p).ok()).collect();

    let asset_map = assets::process_assets(config, mode)?;
    let mut rebuilt = 0;

    for (entry, directive) in pages.entries.iter().zip(&pages.directives) {
        let matches = fs::canonicalize(&entry.script)
            .is_ok_and(|script| changed.iter().any(|c| *c == script));
        if !matches {
            continue;
        }

        bundler::bundle_entry(entry, config, mode)?;
        let mut manifest = ChunkManifest::default();
        manifest.insert(entry.name.clone(), finalize_entry(config, &entry.name, mode)?);

        let template = read_template(&directive.template)?;
        let bytes = html::render_page(directive, &template, &manifest, &asset_map, config, mode)?;
        write_page(config, &directive.filename, &bytes)?;
        rebuilt += 1;
    }

    Ok(rebuilt)
}

/// Re-run the asset pipeline and re-render every page.
///
/// Inlined data URIs live inside the HTML, so an asset change invalidates
/// all generated pages even though no bundle changed. Development only.
pub fn rebuild_assets(config: &AppConfig, mode: Mode) -> Result<()> {
    let pages = entries::derive_pages(config)?;
    let asset_map = assets::process_assets(config, mode)?;

    let manifest: ChunkManifest = pages
        .entries
        .iter()
        .map(|entry| (entry.name.clone(), existing_chunks(config, &entry.name)))
        .collect();

    render_pages(&pages, &manifest, &asset_map, config, mode)
}

/// Read the shared HTML template. Failure here aborts the build before any
/// bundling starts.
fn read_template(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))
}

/// Clean (when requested) and recreate the output directory.
fn prepare_output(config: &AppConfig, mode: Mode) -> Result<()> {
    let output = &config.build.output;

    if config.should_clean(mode) && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    Ok(())
}

/// Settle every page's bundler outputs and collect the final chunk names.
fn finalize_entries(config: &AppConfig, pages: &PageSet, mode: Mode) -> Result<ChunkManifest> {
    pages
        .entries
        .iter()
        .map(|entry| Ok((entry.name.clone(), finalize_entry(config, &entry.name, mode)?)))
        .collect()
}

/// Write the HTML for every directive. All directives share one template,
/// read once.
fn render_pages(
    pages: &PageSet,
    manifest: &ChunkManifest,
    asset_map: &AssetMap,
    config: &AppConfig,
    mode: Mode,
) -> Result<()> {
    let Some(first) = pages.directives.first() else {
        return Ok(());
    };
    let template = read_template(&first.template)?;

    for directive in &pages.directives {
        let bytes = html::render_page(directive, &template, manifest, asset_map, config, mode)?;
        write_page(config, &directive.filename, &bytes)?;
    }
    Ok(())
}

fn write_page(config: &AppConfig, filename: &str, bytes: &[u8]) -> Result<()> {
    let path = config.build.output.join(filename);
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Settle one page's bundler outputs into their final locations and names.
///
/// The bundler writes `js/<name>.js` (plus `<name>.css` and `.map` files
/// alongside). In production both bundles get content-hashed names; the
/// stylesheet always moves to the `css/` directory.
fn finalize_entry(config: &AppConfig, name: &str, mode: Mode) -> Result<PageChunks> {
    let hashed = mode.is_production();
    let js_src = bundler::script_outfile(config, name);
    let js_dir = config.build.output.join(SCRIPT_DIR);
    let css_dir = config.build.output.join(STYLE_DIR);

    let script = finalize_bundle(&js_src, &js_dir, name, "js", hashed)?
        .with_context(|| format!("Bundler produced no output for `{name}`"))?;
    let style = finalize_bundle(&js_src.with_extension("css"), &css_dir, name, "css", hashed)?;

    Ok(PageChunks { script, style })
}

/// Move one bundle (and its source map) to `dest_dir`, hashing the filename
/// when requested. Returns the final filename, or None when the bundle does
/// not exist (a page without styles has no CSS bundle).
fn finalize_bundle(
    src: &Path,
    dest_dir: &Path,
    stem: &str,
    ext: &str,
    hashed: bool,
) -> Result<Option<String>> {
    if !src.is_file() {
        return Ok(None);
    }

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    let plain = format!("{stem}.{ext}");
    let filename = if hashed {
        hash::hashed_name(stem, ext, &hash::file_hash(src)?)
    } else {
        plain.clone()
    };
    let dest = dest_dir.join(&filename);
    let map_src = src.with_extension(format!("{ext}.map"));

    if hashed {
        // The bundle references its map by the plain name; keep the pair
        // consistent after renaming
        let content = fs::read_to_string(src)
            .with_context(|| format!("Failed to read bundle {}", src.display()))?;
        let content = content.replace(&format!("{plain}.map"), &format!("{filename}.map"));
        fs::write(&dest, content)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        fs::remove_file(src).ok();
    } else if src != dest {
        fs::rename(src, &dest)
            .with_context(|| format!("Failed to move bundle to {}", dest.display()))?;
    }

    if map_src.is_file() {
        let map_dest = dest_dir.join(format!("{filename}.map"));
        if map_src != map_dest {
            fs::rename(&map_src, &map_dest)
                .with_context(|| format!("Failed to move source map to {}", map_dest.display()))?;
        }
    }

    Ok(Some(filename))
}

/// Chunk names for an already-finalized development build.
fn existing_chunks(config: &AppConfig, name: &str) -> PageChunks {
    let style = format!("{name}.css");
    let has_style = config.build.output.join(STYLE_DIR).join(&style).is_file();
    PageChunks {
        script: format!("{name}.js"),
        style: has_style.then_some(style),
    }
}

/// Log build result based on output directory contents
fn log_build_result(output: &Path) -> Result<()> {
    let file_count = fs::read_dir(output)?.filter_map(Result::ok).count();

    if file_count == 0 {
        log!("warn"; "output is empty, check if the pages directory has scripts");
    } else {
        log!("build"; "done");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(src_rel: &str, content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join(src_rel);
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, content).unwrap();
        (tmp, src)
    }

    #[test]
    fn test_finalize_bundle_development_keeps_name() {
        let (tmp, src) = setup("dist/js/home.js", "console.log(1)");
        let js_dir = tmp.path().join("dist/js");

        let name = finalize_bundle(&src, &js_dir, "home", "js", false).unwrap().unwrap();

        assert_eq!(name, "home.js");
        assert!(src.is_file());
    }

    #[test]
    fn test_finalize_bundle_production_hashes_name() {
        let (tmp, src) = setup("dist/js/home.js", "console.log(1)");
        let js_dir = tmp.path().join("dist/js");

        let name = finalize_bundle(&src, &js_dir, "home", "js", true).unwrap().unwrap();

        assert!(name.starts_with("home."));
        assert!(name.ends_with(".js"));
        assert_ne!(name, "home.js");
        assert!(js_dir.join(&name).is_file());
        assert!(!src.is_file());

        // Same content hashes to the same name on a rebuild
        fs::write(&src, "console.log(1)").unwrap();
        let again = finalize_bundle(&src, &js_dir, "home", "js", true).unwrap().unwrap();
        assert_eq!(name, again);
    }

    #[test]
    fn test_finalize_bundle_rewrites_map_reference() {
        let (tmp, src) =
            setup("dist/js/home.js", "x()\n//# sourceMappingURL=home.js.map\n");
        fs::write(tmp.path().join("dist/js/home.js.map"), "{}").unwrap();
        let js_dir = tmp.path().join("dist/js");

        let name = finalize_bundle(&src, &js_dir, "home", "js", true).unwrap().unwrap();

        let content = fs::read_to_string(js_dir.join(&name)).unwrap();
        assert!(content.contains(&format!("sourceMappingURL={name}.map")));
        assert!(js_dir.join(format!("{name}.map")).is_file());
        assert!(!js_dir.join("home.js.map").exists());
    }

    #[test]
    fn test_finalize_bundle_moves_stylesheet() {
        let (tmp, src) = setup("dist/js/home.css", "body{}");
        let css_dir = tmp.path().join("dist/css");

        let name = finalize_bundle(&src, &css_dir, "home", "css", false).unwrap().unwrap();

        assert_eq!(name, "home.css");
        assert!(css_dir.join("home.css").is_file());
        assert!(!src.exists());
    }

    #[test]
    fn test_finalize_bundle_missing_source_is_none() {
        let tmp = TempDir::new().unwrap();
        let result = finalize_bundle(
            &tmp.path().join("dist/js/home.css"),
            &tmp.path().join("dist/css"),
            "home",
            "css",
            false,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_existing_chunks_detects_stylesheet() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.build.output = tmp.path().join("dist");

        let chunks = existing_chunks(&config, "home");
        assert_eq!(chunks.script, "home.js");
        assert_eq!(chunks.style, None);

        fs::create_dir_all(tmp.path().join("dist/css")).unwrap();
        fs::write(tmp.path().join("dist/css/home.css"), "body{}").unwrap();
        let chunks = existing_chunks(&config, "home");
        assert_eq!(chunks.style, Some("home.css".to_string()));
    }

    #[test]
    fn test_prepare_output_cleans_in_production() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.build.output = tmp.path().join("dist");

        fs::create_dir_all(config.build.output.join("js")).unwrap();
        fs::write(config.build.output.join("stale.html"), "old").unwrap();

        prepare_output(&config, Mode::Production).unwrap();
        assert!(config.build.output.exists());
        assert!(!config.build.output.join("stale.html").exists());

        // Development keeps previous output around
        fs::write(config.build.output.join("kept.html"), "new").unwrap();
        prepare_output(&config, Mode::Development).unwrap();
        assert!(config.build.output.join("kept.html").exists());
    }

    #[test]
    fn test_render_pages_writes_one_file_per_directive() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("index.html"),
            "<html><head></head><body></body></html>",
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("dist")).unwrap();

        let mut config = AppConfig::default();
        config.build.root = Some(tmp.path().to_path_buf());
        config.pages.dir = tmp.path().join("src/pages");
        config.pages.template = tmp.path().join("index.html");
        config.build.output = tmp.path().join("dist");

        let pages = {
            fs::create_dir_all(tmp.path().join("src/pages")).unwrap();
            fs::write(tmp.path().join("src/pages/home.js"), "x").unwrap();
            fs::write(tmp.path().join("src/pages/about.js"), "x").unwrap();
            entries::derive_pages(&config).unwrap()
        };

        let manifest: ChunkManifest = pages
            .entries
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    PageChunks { script: format!("{}.js", e.name), style: None },
                )
            })
            .collect();

        render_pages(&pages, &manifest, &AssetMap::default(), &config, Mode::Development)
            .unwrap();

        let home = fs::read_to_string(tmp.path().join("dist/home.html")).unwrap();
        let about = fs::read_to_string(tmp.path().join("dist/about.html")).unwrap();
        assert!(home.contains("/js/home.js"));
        assert!(!home.contains("/js/about.js"));
        assert!(about.contains("/js/about.js"));
    }
}
