//! Project initialization module.
//!
//! Creates a new project structure with default configuration.

use crate::config::AppConfig;
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Default config filename
const CONFIG_FILE: &str = "pagepack.toml";

/// Default project directory structure
const PROJECT_DIRS: &[&str] = &["src/pages", "assets"];

/// Starter files written into a fresh project
const STARTER_FILES: &[(&str, &str)] = &[
    ("index.html", include_str!("embed/init/index.html")),
    ("src/pages/home.js", include_str!("embed/init/home.js")),
    ("src/pages/about.js", include_str!("embed/init/about.js")),
];

/// Create a new project with default structure
pub fn new_project(config: &AppConfig, has_name: bool) -> Result<()> {
    let root = config.get_root();

    // Safety check: if no name was provided (init in current dir),
    // the directory must be completely empty
    if !has_name && !is_dir_empty(root)? {
        bail!(
            "Current directory is not empty. Use `pagepack init <NAME>` to create in a subdirectory."
        );
    }

    init_project_structure(root)?;
    init_default_config(root)?;
    init_starter_files(root)?;
    init_ignored_files(root, &[Path::new("dist")])?;

    Ok(())
}

/// Check if a directory is completely empty
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Write default configuration file
fn init_default_config(root: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&AppConfig::default())?;
    fs::write(root.join(CONFIG_FILE), content)?;
    Ok(())
}

/// Create project directory structure
fn init_project_structure(root: &Path) -> Result<()> {
    for dir in PROJECT_DIRS {
        let path = root.join(dir);
        if path.exists() {
            bail!(
                "Path `{}` already exists. Try `pagepack init <NAME>` instead.",
                path.display()
            );
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

/// Write the shared template and starter page scripts
fn init_starter_files(root: &Path) -> Result<()> {
    for (rel, content) in STARTER_FILES {
        let path = root.join(rel);
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Initialize .gitignore and .ignore files with specified paths
fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>()
        .join("\n");

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, &content)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_at(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.build.root = Some(root.to_path_buf());
        config
    }

    #[test]
    fn test_init_creates_structure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("myapp");
        let config = config_at(&root);

        new_project(&config, true).unwrap();

        assert!(root.join("pagepack.toml").is_file());
        assert!(root.join("index.html").is_file());
        assert!(root.join("src/pages/home.js").is_file());
        assert!(root.join("src/pages/about.js").is_file());
        assert!(root.join("assets").is_dir());
        assert!(root.join(".gitignore").is_file());

        // The generated config round-trips
        let parsed = AppConfig::from_path(&root.join("pagepack.toml")).unwrap();
        assert_eq!(parsed.serve.port, 2019);
    }

    #[test]
    fn test_init_refuses_nonempty_dir_without_name() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("existing.txt"), "x").unwrap();
        let config = config_at(tmp.path());

        assert!(new_project(&config, false).is_err());
    }

    #[test]
    fn test_init_refuses_existing_structure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("myapp");
        let config = config_at(&root);

        new_project(&config, true).unwrap();
        let err = new_project(&config, true).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
