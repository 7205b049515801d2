//! Stilo - a small static site builder with a hot-reloading dev server.

mod build;
mod cli;
mod compiler;
mod config;
mod logger;
mod serve;
mod watch;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;
use std::path::Path;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static SiteConfig = Box::leak(Box::new(load_config(cli)?));

    match &cli.command {
        Commands::Build => {
            let summary = build_site(config)?;
            log!("build"; "{summary}");
            Ok(())
        }
        Commands::Serve { .. } => serve_site(config),
    }
}

/// Load configuration from the project root, falling back to defaults
/// when no config file is present, then apply CLI overrides.
fn load_config(cli: &'static Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}
