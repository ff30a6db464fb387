//! Configuration management for fileserve
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use fileserve::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FILESERVE__<section>__<key>`
//!
//! Examples:
//! - `FILESERVE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `FILESERVE__SERVER__MOUNT=static`
//! - `FILESERVE__ADAPTER__STRIP_EXTENSIONS=true`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/fileserve.toml`.
//! This can be overridden using the `FILESERVE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{AdapterConfig, Config, MountConfig, ServerConfig};
pub use sources::config_path;
pub use validation::ValidationError;

use std::sync::Arc;
use thiserror::Error;

use crate::files::{DefaultAdapter, FileAdapter, FileHandler, RegistryError, StripExtension};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Registration failed: {0}")]
    RegistryError(#[from] RegistryError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`FILESERVE__*`)
    /// 2. TOML file (default: `config/fileserve.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (missing mounts, duplicate contexts, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config, config.adapter().as_ref())?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config, config.adapter().as_ref())?;
        Ok(config)
    }

    /// Adapter selected by the `[adapter]` section
    pub fn adapter(&self) -> Arc<dyn FileAdapter> {
        if self.adapter.strip_extensions {
            Arc::new(StripExtension)
        } else {
            Arc::new(DefaultAdapter)
        }
    }

    /// Build a file handler with every configured file and directory registered
    pub fn file_handler(&self) -> Result<FileHandler, ConfigError> {
        let handler = FileHandler::with_adapter(self.adapter());

        for mount in &self.files {
            handler.add_file(&mount.path, mount.name.as_deref(), &mount.options());
        }
        for mount in &self.directories {
            handler.add_directory(&mount.path, mount.name.as_deref(), &mount.options())?;
        }

        Ok(handler)
    }
}
