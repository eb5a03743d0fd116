//! Configuration module for bergamot
//!
//! Loads config from `$XDG_CONFIG_HOME/bergamot/config.toml` or the platform
//! config directory. Falls back to embedded defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use bergamot_models::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Default provider: {}", config.default_provider);
//! for provider in &config.providers {
//!     println!("{} -> {}", provider.name, provider.url);
//! }
//! ```

pub mod schema;

use crate::error::{BergamotError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use schema::{Config, EngineConfig, NetworkConfig, ProviderConfig, ProviderKind};

impl Config {
    /// Load config from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from an explicit path, or defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            BergamotError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        if config.providers.is_empty() {
            return Err(BergamotError::Config(format!(
                "{} declares no providers",
                path.display()
            )));
        }

        Ok(config)
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else {
        dirs::config_dir()
            .ok_or_else(|| BergamotError::Config("Cannot determine config directory".to_string()))?
    };

    Ok(config_dir.join("bergamot").join("config.toml"))
}
