//! HTML generation from the shared template.
//!
//! Realizes one HtmlDirective: injects the chunks the directive names into
//! the template, rewrites asset references, appends the live-reload client
//! in development, and minifies the result in production. Every page is
//! generated from the same template and its directive names only its own
//! chunk.

use crate::{
    assets::{AssetMap, AssetRef},
    bundler::{SCRIPT_DIR, STYLE_DIR},
    config::{AppConfig, Mode},
    entries::HtmlDirective,
    reload,
};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

/// Final bundle filenames for one page, as produced by build finalization
/// (plain in development, content-hashed in production).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunks {
    /// Script bundle filename inside the `js/` output directory
    pub script: String,
    /// Stylesheet filename inside the `css/` output directory, when the
    /// page imports styles
    pub style: Option<String>,
}

/// Page name → finalized bundle filenames, filled in after bundling.
pub type ChunkManifest = FxHashMap<String, PageChunks>;

/// Render the HTML for one page.
///
/// Fails only when the manifest is missing a chunk the directive names,
/// which means bundling did not produce output for that page.
pub fn render_page(
    directive: &HtmlDirective,
    template: &str,
    manifest: &ChunkManifest,
    assets: &AssetMap,
    config: &AppConfig,
    mode: Mode,
) -> Result<Vec<u8>> {
    let mut html = rewrite_asset_refs(template, assets);

    for name in &directive.chunks {
        let chunks = manifest
            .get(name)
            .with_context(|| format!("No bundle recorded for chunk `{name}`"))?;

        if let Some(style) = &chunks.style {
            let href = config.public_href(&format!("{STYLE_DIR}/{style}"));
            insert_before(
                &mut html,
                "</head>",
                &format!(r#"<link rel="stylesheet" href="{href}">"#),
            );
        }

        let src = config.public_href(&format!("{SCRIPT_DIR}/{}", chunks.script));
        insert_before(&mut html, "</body>", &format!(r#"<script defer src="{src}"></script>"#));
    }

    if mode.is_development() {
        insert_before(&mut html, "</body>", &reload::client_script(config));
    }

    Ok(if config.minify(mode) {
        minify(html.as_bytes())
    } else {
        html.into_bytes()
    })
}

/// Replace template references to asset files with their data URI or
/// static href.
fn rewrite_asset_refs(template: &str, assets: &AssetMap) -> String {
    let mut html = template.to_owned();
    for (key, asset_ref) in assets.iter() {
        let replacement = match asset_ref {
            AssetRef::Inline(uri) => uri.as_str(),
            AssetRef::Static { href } => href.as_str(),
        };
        html = html.replace(key, replacement);
    }
    html
}

/// Insert `content` before the last occurrence of `marker`, or append when
/// the template has no such tag.
fn insert_before(html: &mut String, marker: &str, content: &str) {
    match html.rfind(marker) {
        Some(index) => html.insert_str(index, content),
        None => html.push_str(content),
    }
}

/// Minify HTML content using `minify_html` crate.
fn minify(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    minify_html::minify(html, &cfg)
}
