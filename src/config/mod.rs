//! Site configuration management for `stilo.toml`.
//!
//! # Sections
//!
//! | Section   | Purpose                                        |
//! |-----------|------------------------------------------------|
//! | `[build]` | Source and output directory layout             |
//! | `[serve]` | Development server (interface, port, watch)    |
//!
//! # Example
//!
//! ```toml
//! [build]
//! pages = "pages"
//! templates = "templates"
//! data = "data"
//! output = "build"
//!
//! [serve]
//! port = 1313
//! watch = true
//! ```
//!
//! The config file is optional; every field has a default. CLI arguments
//! override file values, and all directory paths are normalized to
//! absolute paths under the project root after loading.

mod build;
pub mod defaults;
mod error;
mod serve;

use build::BuildConfig;
use error::ConfigError;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing stilo.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content)?;
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
        self.build.root = Some(path.to_path_buf());
    }

    /// Get CLI arguments reference
    pub fn get_cli(&self) -> &'static Cli {
        self.cli.unwrap()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        let root = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());

        self.set_root(&root);
        self.update_path_with_root(&root);

        if let Commands::Serve {
            interface,
            port,
            watch,
            skip_build,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
            if *skip_build {
                self.serve.skip_build = true;
            }
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path) {
        let cli = self.get_cli();

        // Apply CLI overrides first
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        // Normalize root to absolute path
        let root = Self::normalize_path(root);
        self.set_root(&root);

        // Normalize config path
        self.config_path = Self::normalize_path(&root.join(&cli.config));

        // Normalize all directory paths
        self.build.pages = Self::normalize_path(&root.join(&self.build.pages));
        self.build.templates = Self::normalize_path(&root.join(&self.build.templates));
        self.build.data = Self::normalize_path(&root.join(&self.build.data));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration.
    ///
    /// The output directory is the only path the pipeline writes into and
    /// the clean step empties it on every run, so it must never coincide
    /// with (or contain) a source directory.
    pub fn validate(&self) -> Result<()> {
        let sources = [
            ("[build.pages]", &self.build.pages),
            ("[build.templates]", &self.build.templates),
            ("[build.data]", &self.build.data),
        ];

        for (name, path) in sources {
            if *path == self.build.output {
                bail!(ConfigError::Validation(format!(
                    "{name} must differ from [build.output]"
                )));
            }
            if path.starts_with(&self.build.output) {
                bail!(ConfigError::Validation(format!(
                    "{name} must not be inside [build.output]"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SiteConfig::from_str("").unwrap();

        assert_eq!(config.build.pages, PathBuf::from("pages"));
        assert_eq!(config.build.templates, PathBuf::from("templates"));
        assert_eq!(config.build.data, PathBuf::from("data"));
        assert_eq!(config.build.output, PathBuf::from("build"));
        assert_eq!(config.serve.port, 1313);
        assert_eq!(config.serve.interface, "127.0.0.1");
        assert!(config.serve.watch);
        assert!(!config.serve.skip_build);
    }

    #[test]
    fn test_unknown_section_rejection() {
        let result = SiteConfig::from_str(
            r#"
            [unknown]
            field = 1
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_output_equals_source() {
        let mut config = SiteConfig::default();
        config.build.pages = PathBuf::from("/site/build");
        config.build.output = PathBuf::from("/site/build");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_source_inside_output() {
        let mut config = SiteConfig::default();
        config.build.data = PathBuf::from("/site/build/data");
        config.build.output = PathBuf::from("/site/build");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_disjoint_paths() {
        let mut config = SiteConfig::default();
        config.build.pages = PathBuf::from("/site/pages");
        config.build.templates = PathBuf::from("/site/templates");
        config.build.data = PathBuf::from("/site/data");
        config.build.output = PathBuf::from("/site/build");

        assert!(config.validate().is_ok());
    }
}
