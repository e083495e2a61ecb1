//! Pagepack - a multi-page app builder.
//!
//! Derives one bundler entry and one HTML output per page script, drives the
//! external bundler, and serves the result with live reload in development.

mod assets;
mod build;
mod bundler;
mod cli;
mod config;
mod entries;
mod html;
mod init;
mod logger;
mod reload;
mod serve;
mod utils;
mod watch;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static AppConfig = Box::leak(Box::new(load_config(cli)?));

    match &cli.command {
        Commands::Init { name } => init::new_project(config, name.is_some()),
        Commands::Build { .. } => build::build_site(config, config.mode()),
        Commands::Serve { .. } => {
            let mode = config.mode();
            build::build_site(config, mode)?;
            serve::serve_site(config, mode)
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &'static Cli) -> Result<AppConfig> {
    let root = cli.root.as_deref().unwrap_or(std::path::Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        AppConfig::from_path(&config_path)?
    } else {
        AppConfig::default()
    };
    config.update_with_cli(cli);

    // Validate config state based on command
    let config_exists = config.config_path.exists();
    match (cli.is_init(), config_exists) {
        (true, true) => {
            bail!("Config file already exists. Remove it manually or init in a different path.")
        }
        (false, false) => bail!("Config file not found."),
        _ => {}
    }

    if !cli.is_init() {
        config.validate()?;
    }

    Ok(config)
}
