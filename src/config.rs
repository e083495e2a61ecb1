//! Project configuration management.
//!
//! Handles loading, parsing, and validating the `pagepack.toml` configuration
//! file, plus the Development/Production mode resolution.

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default values for serde deserialization
pub mod config_defaults {
    pub fn r#true() -> bool {
        true
    }

    pub fn r#false() -> bool {
        false
    }

    pub mod pages {
        use crate::config::CollisionPolicy;
        use std::path::PathBuf;

        pub fn dir() -> PathBuf {
            "src/pages".into()
        }
        pub fn template() -> PathBuf {
            "index.html".into()
        }
        pub fn extensions() -> Vec<String> {
            vec!["js".into(), "jsx".into()]
        }
        pub fn on_collision() -> CollisionPolicy {
            CollisionPolicy::default()
        }
    }

    pub mod build {
        use crate::config::Mode;
        use std::path::PathBuf;

        pub fn root() -> Option<PathBuf> {
            None
        }
        pub fn output() -> PathBuf {
            "dist".into()
        }
        pub fn public_path() -> String {
            "/".into()
        }
        pub fn mode() -> Option<Mode> {
            None
        }
        pub fn minify() -> Option<bool> {
            None
        }
    }

    pub mod bundler {
        pub fn command() -> Vec<String> {
            vec!["esbuild".into()]
        }
        pub fn args() -> Vec<String> {
            Vec::new()
        }
    }

    pub mod assets {
        use std::path::PathBuf;

        pub fn dir() -> PathBuf {
            "assets".into()
        }
        pub fn static_dir() -> PathBuf {
            "static".into()
        }
        pub fn inline_max_size() -> String {
            "10KB".into()
        }
    }

    pub mod serve {
        pub fn interface() -> String {
            "127.0.0.1".into()
        }
        pub fn port() -> u16 {
            2019
        }
        pub fn fallback() -> String {
            "index.html".into()
        }
    }
}

/// Build profile selecting between the development and production pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Dev server, live reload, plain filenames, inline source maps
    Development,
    /// Cleaned output, hashed filenames, minified HTML, external source maps
    Production,
}

impl Mode {
    /// Interpret a mode flag: `development` selects Development, anything
    /// else selects Production.
    pub fn from_flag(flag: &str) -> Self {
        if flag.eq_ignore_ascii_case("development") {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// What to do when two page scripts share a base name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Log a warning; the last-discovered script wins (default)
    #[default]
    Warn,
    /// Abort the build naming both scripts
    Error,
}

#[test]
fn test_mode_from_flag() {
    assert_eq!(Mode::from_flag("development"), Mode::Development);
    assert_eq!(Mode::from_flag("DEVELOPMENT"), Mode::Development);
    // Anything that is not `development` means production
    assert_eq!(Mode::from_flag("production"), Mode::Production);
    assert_eq!(Mode::from_flag("staging"), Mode::Production);
    assert_eq!(Mode::from_flag(""), Mode::Production);
}

#[test]
fn test_mode_parsing() {
    let config = r#"
        [build]
        mode = "development"
    "#;
    let config: AppConfig = toml::from_str(config).unwrap();
    assert_eq!(config.build.mode, Some(Mode::Development));

    let config: AppConfig = toml::from_str("[build]\nmode = \"production\"").unwrap();
    assert_eq!(config.build.mode, Some(Mode::Production));
}

#[test]
fn test_collision_policy_parsing() {
    let config: AppConfig = toml::from_str("[pages]\non_collision = \"error\"").unwrap();
    assert_eq!(config.pages.on_collision, CollisionPolicy::Error);

    let config: AppConfig = toml::from_str("").unwrap();
    assert_eq!(config.pages.on_collision, CollisionPolicy::Warn);
}

/// `[pages]` section in pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct PagesConfig {
    /// Directory scanned for page entry scripts (relative to root)
    #[serde(default = "config_defaults::pages::dir")]
    #[educe(Default = config_defaults::pages::dir())]
    pub dir: PathBuf,

    /// Shared HTML template used for every generated page
    #[serde(default = "config_defaults::pages::template")]
    #[educe(Default = config_defaults::pages::template())]
    pub template: PathBuf,

    /// File extensions treated as page scripts
    #[serde(default = "config_defaults::pages::extensions")]
    #[educe(Default = config_defaults::pages::extensions())]
    pub extensions: Vec<String>,

    /// Descend into subdirectories when scanning
    #[serde(default = "config_defaults::r#false")]
    #[educe(Default = false)]
    pub recursive: bool,

    /// Behavior when two scripts share a base name
    #[serde(default = "config_defaults::pages::on_collision")]
    #[educe(Default = config_defaults::pages::on_collision())]
    pub on_collision: CollisionPolicy,
}

#[test]
fn test_pages_config_defaults() {
    let config: AppConfig = toml::from_str("").unwrap();

    assert_eq!(config.pages.dir, PathBuf::from("src/pages"));
    assert_eq!(config.pages.template, PathBuf::from("index.html"));
    assert_eq!(config.pages.extensions, vec!["js".to_string(), "jsx".to_string()]);
    assert!(!config.pages.recursive);
}

#[test]
fn test_pages_config() {
    let config = r#"
        [pages]
        dir = "web/pages"
        template = "web/app.html"
        extensions = ["ts", "tsx"]
        recursive = true
    "#;
    let config: AppConfig = toml::from_str(config).unwrap();

    assert_eq!(config.pages.dir, PathBuf::from("web/pages"));
    assert_eq!(config.pages.template, PathBuf::from("web/app.html"));
    assert_eq!(config.pages.extensions, vec!["ts".to_string(), "tsx".to_string()]);
    assert!(config.pages.recursive);
}

/// `[build]` section in pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Root directory path
    #[serde(default = "config_defaults::build::root")]
    #[educe(Default = config_defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Output directory path (relative to root)
    #[serde(default = "config_defaults::build::output")]
    #[educe(Default = config_defaults::build::output())]
    pub output: PathBuf,

    /// URL prefix for generated references, e.g.: "/"
    #[serde(default = "config_defaults::build::public_path")]
    #[educe(Default = config_defaults::build::public_path())]
    pub public_path: String,

    /// Default build mode when no flag is given
    #[serde(default = "config_defaults::build::mode")]
    #[educe(Default = config_defaults::build::mode())]
    pub mode: Option<Mode>,

    /// Clean the output directory even in development
    /// (production always cleans)
    #[serde(default = "config_defaults::r#false")]
    #[educe(Default = false)]
    pub clean: bool,

    /// Minify generated HTML; unset means production-only
    #[serde(default = "config_defaults::build::minify")]
    #[educe(Default = config_defaults::build::minify())]
    pub minify: Option<bool>,
}

#[test]
fn test_build_config_defaults() {
    let config: AppConfig = toml::from_str("").unwrap();

    assert_eq!(config.build.output, PathBuf::from("dist"));
    assert_eq!(config.build.public_path, "/");
    assert_eq!(config.build.mode, None);
    assert_eq!(config.build.minify, None);
    assert!(!config.build.clean);
}

/// `[bundler]` section in pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerConfig {
    /// Bundler command and leading arguments
    #[serde(default = "config_defaults::bundler::command")]
    #[educe(Default = config_defaults::bundler::command())]
    pub command: Vec<String>,

    /// Extra arguments appended to every bundler invocation
    #[serde(default = "config_defaults::bundler::args")]
    #[educe(Default = config_defaults::bundler::args())]
    pub args: Vec<String>,
}

#[test]
fn test_bundler_config() {
    let config = r#"
        [bundler]
        command = ["npx", "esbuild"]
        args = ["--target=es2018"]
    "#;
    let config: AppConfig = toml::from_str(config).unwrap();

    assert_eq!(config.bundler.command, vec!["npx".to_string(), "esbuild".to_string()]);
    assert_eq!(config.bundler.args, vec!["--target=es2018".to_string()]);
}

/// `[assets]` section in pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Assets directory path (relative to root)
    #[serde(default = "config_defaults::assets::dir")]
    #[educe(Default = config_defaults::assets::dir())]
    pub dir: PathBuf,

    /// Directory name for copied assets inside the output tree
    #[serde(default = "config_defaults::assets::static_dir")]
    #[educe(Default = config_defaults::assets::static_dir())]
    pub static_dir: PathBuf,

    /// Max size for data-URI inlined images (e.g.: "10KB", "1MB")
    #[serde(default = "config_defaults::assets::inline_max_size")]
    #[educe(Default = config_defaults::assets::inline_max_size())]
    pub inline_max_size: String,
}

/// `[serve]` section in pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind (e.g.: "127.0.0.1", "0.0.0.0")
    #[serde(default = "config_defaults::serve::interface")]
    #[educe(Default = config_defaults::serve::interface())]
    pub interface: String,

    /// Port number to listen on
    #[serde(default = "config_defaults::serve::port")]
    #[educe(Default = config_defaults::serve::port())]
    pub port: u16,

    /// Enable file watching for live reload
    #[serde(default = "config_defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Page served for unmatched paths (SPA-style fallback)
    #[serde(default = "config_defaults::serve::fallback")]
    #[educe(Default = config_defaults::serve::fallback())]
    pub fallback: String,
}

#[test]
fn test_serve_config() {
    let config = r#"
        [serve]
        interface = "0.0.0.0"
        port = 8080
        watch = false
        fallback = "home.html"
    "#;
    let config: AppConfig = toml::from_str(config).unwrap();

    assert_eq!(config.serve.interface, "0.0.0.0");
    assert_eq!(config.serve.port, 8080);
    assert!(!config.serve.watch);
    assert_eq!(config.serve.fallback, "home.html");
}

#[test]
fn test_serve_config_defaults() {
    let config: AppConfig = toml::from_str("").unwrap();

    assert_eq!(config.serve.interface, "127.0.0.1");
    assert_eq!(config.serve.port, 2019);
    assert!(config.serve.watch);
    assert_eq!(config.serve.fallback, "index.html");
}

#[test]
fn test_unknown_field_rejection() {
    let result: Result<AppConfig, _> = toml::from_str("[pages]\nunknown_field = 1");
    assert!(result.is_err());

    let result: Result<AppConfig, _> = toml::from_str("[serve]\nunknown_field = 1");
    assert!(result.is_err());
}

/// Root configuration structure representing pagepack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Resolved config file path
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Page discovery settings
    #[serde(default)]
    pub pages: PagesConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// External bundler settings
    #[serde(default)]
    pub bundler: BundlerConfig,

    /// Static asset settings
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl AppConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf())
    }

    /// Get CLI arguments reference
    pub fn get_cli(&self) -> &'static Cli {
        self.cli.expect("CLI reference set in update_with_cli")
    }

    /// The resolved build mode.
    ///
    /// Precedence: `--mode` flag > `PAGEPACK_MODE` environment variable >
    /// `[build].mode` > per-command default (serve ⇒ development,
    /// build ⇒ production). Everything below the CLI layer takes the result
    /// as a plain value.
    pub fn mode(&self) -> Mode {
        self.build.mode.unwrap_or(if self.get_cli().is_serve() {
            Mode::Development
        } else {
            Mode::Production
        })
    }

    /// Whether generated HTML should be minified under `mode`.
    pub fn minify(&self, mode: Mode) -> bool {
        self.build.minify.unwrap_or(mode.is_production())
    }

    /// Whether the output directory is cleaned before building.
    /// Production always cleans; development only with `[build].clean`.
    pub fn should_clean(&self, mode: Mode) -> bool {
        mode.is_production() || self.build.clean
    }

    /// Prefix a root-relative output file with the public path.
    pub fn public_href(&self, rel: &str) -> String {
        let base = &self.build.public_path;
        if base.ends_with('/') {
            format!("{base}{rel}")
        } else {
            format!("{base}/{rel}")
        }
    }

    /// Parse `inline_max_size` string (e.g., "10KB") to bytes
    pub fn get_inline_max_size(&self) -> usize {
        let size_str = &self.assets.inline_max_size;
        let multiplier = if size_str.ends_with("MB") {
            1024 * 1024
        } else if size_str.ends_with("KB") {
            1024
        } else {
            1
        };
        let value: usize = size_str
            .trim_end_matches(|c: char| c.is_ascii_uppercase())
            .parse()
            .unwrap_or(0);
        multiplier * value
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        let root = cli.root.as_ref().cloned().unwrap_or_else(|| self.get_root().to_owned());
        self.update_path_with_root(&root);

        self.assets.inline_max_size = self.assets.inline_max_size.to_uppercase();

        match &cli.command {
            Commands::Init { name: Some(name) } => {
                let new_root = self.build.root.as_ref().map_or_else(
                    || name.clone(),
                    |r| r.join(name),
                );
                self.update_path_with_root(&new_root);
            }
            Commands::Build { build_args } => {
                self.apply_build_args(build_args);
            }
            Commands::Serve { build_args, interface, port, watch } => {
                self.apply_build_args(build_args);
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            _ => {}
        }

        // Environment fallback for the mode flag, applied once here so that
        // nothing below the CLI layer reads ambient process state
        if self.build.mode.is_none()
            && let Ok(flag) = std::env::var("PAGEPACK_MODE")
        {
            self.build.mode = Some(Mode::from_flag(&flag));
        }
    }

    /// Apply shared build arguments (mode, clean, minify)
    fn apply_build_args(&mut self, args: &crate::cli::BuildArgs) {
        if let Some(flag) = &args.mode {
            self.build.mode = Some(Mode::from_flag(flag));
        }
        if args.clean {
            self.build.clean = true;
        }
        if args.minify.is_some() {
            self.build.minify = args.minify;
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory
    fn update_path_with_root(&mut self, root: &Path) {
        let cli = self.get_cli();

        self.set_root(root);
        self.config_path = root.join(&cli.config);

        self.pages.dir = root.join(&self.pages.dir);
        self.pages.template = root.join(&self.pages.template);
        self.build.output = root.join(&self.build.output);
        self.assets.dir = root.join(&self.assets.dir);
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        let cli = self.get_cli();

        if !self.config_path.exists() {
            bail!("Config file not found");
        }

        Self::check_command_installed("[bundler.command]", &self.bundler.command)?;

        if !self.pages.template.is_file() {
            bail!(ConfigError::Validation(format!(
                "[pages.template] not found: {}",
                self.pages.template.display()
            )));
        }

        if self.pages.extensions.is_empty() {
            bail!(ConfigError::Validation(
                "[pages.extensions] must have at least one element".into()
            ));
        }

        let valid_size_suffixes = ["B", "KB", "MB"];
        if !valid_size_suffixes.iter().any(|s| self.assets.inline_max_size.ends_with(s)) {
            bail!(ConfigError::Validation(
                "[assets.inline_max_size] must end with B, KB, or MB".into()
            ));
        }

        if cli.is_init() && self.get_root().exists() {
            bail!("Path already exists");
        }

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        if command.is_empty() {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        }

        let cmd = &command[0];
        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

#[test]
fn test_get_inline_max_size_kb() {
    let config: AppConfig = toml::from_str("[assets]\ninline_max_size = \"10KB\"").unwrap();
    assert_eq!(config.get_inline_max_size(), 10 * 1024);
}

#[test]
fn test_get_inline_max_size_mb() {
    let config: AppConfig = toml::from_str("[assets]\ninline_max_size = \"5MB\"").unwrap();
    assert_eq!(config.get_inline_max_size(), 5 * 1024 * 1024);
}

#[test]
fn test_get_inline_max_size_bytes() {
    let config: AppConfig = toml::from_str("[assets]\ninline_max_size = \"100B\"").unwrap();
    assert_eq!(config.get_inline_max_size(), 100);
}

#[test]
fn test_minify_resolution() {
    let config = AppConfig::default();
    assert!(config.minify(Mode::Production));
    assert!(!config.minify(Mode::Development));

    let mut config = AppConfig::default();
    config.build.minify = Some(false);
    assert!(!config.minify(Mode::Production));

    config.build.minify = Some(true);
    assert!(config.minify(Mode::Development));
}

#[test]
fn test_should_clean() {
    let config = AppConfig::default();
    assert!(config.should_clean(Mode::Production));
    assert!(!config.should_clean(Mode::Development));

    let mut config = AppConfig::default();
    config.build.clean = true;
    assert!(config.should_clean(Mode::Development));
}

#[test]
fn test_public_href() {
    let config = AppConfig::default();
    assert_eq!(config.public_href("js/home.js"), "/js/home.js");

    let mut config = AppConfig::default();
    config.build.public_path = "/app".into();
    assert_eq!(config.public_href("js/home.js"), "/app/js/home.js");
}

#[test]
fn test_from_str_invalid_toml() {
    let invalid_config = r#"
        [pages
        dir = "src/pages"
    "#;
    assert!(AppConfig::from_str(invalid_config).is_err());
}

#[test]
fn test_get_root_default() {
    let config = AppConfig::default();
    assert_eq!(config.get_root(), Path::new("./"));
}

#[test]
fn test_set_root() {
    let mut config = AppConfig::default();
    config.set_root(Path::new("/custom/path"));
    assert_eq!(config.get_root(), Path::new("/custom/path"));
}

#[test]
fn test_config_error_display() {
    let io_err = ConfigError::Io(
        PathBuf::from("pagepack.toml"),
        std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
    );
    let display = format!("{}", io_err);
    assert!(display.contains("IO error"));
    assert!(display.contains("pagepack.toml"));

    let validation_err = ConfigError::Validation("Test validation error".to_string());
    let display = format!("{}", validation_err);
    assert!(display.contains("Test validation error"));
}
