//! External bundler invocation.
//!
//! Builds the command line for one page entry and hands it to the configured
//! bundler command (esbuild by default). Module resolution, transpilation,
//! script minification, and source-map generation all happen inside the
//! bundler; this layer only assembles flags and surfaces the bundler's own
//! diagnostics on failure.

use crate::{
    config::{AppConfig, Mode},
    entries::PageEntry,
    utils::exec::{self, EMPTY_FILTER},
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Subdirectory of the output tree holding script bundles
pub const SCRIPT_DIR: &str = "js";

/// Subdirectory of the output tree holding stylesheet bundles
pub const STYLE_DIR: &str = "css";

/// Image extensions handed to the bundler's file loader when imported
/// from a page script
const FILE_LOADER_EXTS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg"];

/// Where the bundler writes the bundle for `name` before finalization.
/// Stylesheets imported by the page are emitted next to it as `<name>.css`.
pub fn script_outfile(config: &AppConfig, name: &str) -> PathBuf {
    config.build.output.join(SCRIPT_DIR).join(format!("{name}.js"))
}

/// Bundle one page entry.
pub fn bundle_entry(entry: &PageEntry, config: &AppConfig, mode: Mode) -> Result<()> {
    let args = bundle_args(entry, config, mode);
    exec::run(Some(config.get_root()), &config.bundler.command, &args, &EMPTY_FILTER)
        .with_context(|| format!("Bundling `{}` failed", entry.name))?;
    Ok(())
}

/// Assemble the bundler arguments for one entry.
///
/// The entry and outfile arguments are mode-independent; only the source-map
/// style, minification, and the production environment define differ between
/// development and production.
fn bundle_args(entry: &PageEntry, config: &AppConfig, mode: Mode) -> Vec<String> {
    let mut args = vec![
        entry.script.display().to_string(),
        "--bundle".to_string(),
        format!("--outfile={}", script_outfile(config, &entry.name).display()),
        format!("--public-path={}", config.build.public_path),
    ];

    for ext in FILE_LOADER_EXTS {
        args.push(format!("--loader:{ext}=file"));
    }

    match mode {
        Mode::Development => {
            args.push("--sourcemap=inline".to_string());
        }
        Mode::Production => {
            args.push("--minify".to_string());
            args.push("--sourcemap=linked".to_string());
            args.push("--define:process.env.NODE_ENV=\"production\"".to_string());
        }
    }

    args.extend(config.bundler.args.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entry() -> PageEntry {
        PageEntry {
            name: "home".into(),
            script: Path::new("src/pages/home.js").to_path_buf(),
        }
    }

    #[test]
    fn test_development_args() {
        let config = AppConfig::default();
        let args = bundle_args(&entry(), &config, Mode::Development);

        assert!(args.contains(&"--sourcemap=inline".to_string()));
        assert!(!args.contains(&"--minify".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--define:")));
    }

    #[test]
    fn test_production_args() {
        let config = AppConfig::default();
        let args = bundle_args(&entry(), &config, Mode::Production);

        assert!(args.contains(&"--minify".to_string()));
        assert!(args.contains(&"--sourcemap=linked".to_string()));
        assert!(
            args.contains(&"--define:process.env.NODE_ENV=\"production\"".to_string())
        );
        assert!(!args.contains(&"--sourcemap=inline".to_string()));
    }

    #[test]
    fn test_entry_and_outfile_identical_between_modes() {
        let config = AppConfig::default();
        let dev = bundle_args(&entry(), &config, Mode::Development);
        let prod = bundle_args(&entry(), &config, Mode::Production);

        // Entry script, --bundle, outfile, and public path do not depend on
        // the mode; only the trailing flags do
        assert_eq!(dev[..4], prod[..4]);
        assert_eq!(dev[0], "src/pages/home.js");
        assert!(dev[2].ends_with("home.js"));
        assert!(dev[2].contains("dist"));
    }

    #[test]
    fn test_extra_args_are_appended() {
        let mut config = AppConfig::default();
        config.bundler.args = vec!["--target=es2018".to_string()];

        let args = bundle_args(&entry(), &config, Mode::Development);
        assert_eq!(args.last().unwrap(), "--target=es2018");
    }

    #[test]
    fn test_file_loader_flags_present() {
        let config = AppConfig::default();
        let args = bundle_args(&entry(), &config, Mode::Development);
        assert!(args.contains(&"--loader:.png=file".to_string()));
        assert!(args.contains(&"--loader:.svg=file".to_string()));
    }
}
