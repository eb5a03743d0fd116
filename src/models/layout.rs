use crate::error::{BergamotError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Application directory name shared by all providers
pub const APP_NAME: &str = "bergamot";

/// File name of the engine config inside every materialized model
pub const ENGINE_CONFIG_FILE: &str = "config.bergamot.yml";

/// Suffixes stripped from an archive's file name to obtain its stem
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar"];

/// The five per-provider directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDirectories {
    pub cache: PathBuf,
    pub config: PathBuf,
    pub data: PathBuf,
    pub archive: PathBuf,
    pub models: PathBuf,
}

impl ProviderDirectories {
    /// Directories under the platform cache/config/data dirs
    pub fn for_provider(name: &str) -> Result<Self> {
        let cache = dirs::cache_dir()
            .ok_or_else(|| BergamotError::Config("Cannot determine cache directory".to_string()))?;
        let config = dirs::config_dir()
            .ok_or_else(|| BergamotError::Config("Cannot determine config directory".to_string()))?;
        let data = dirs::data_dir()
            .ok_or_else(|| BergamotError::Config("Cannot determine data directory".to_string()))?;

        Ok(Self::from_bases(
            &cache.join(APP_NAME),
            &config.join(APP_NAME),
            &data.join(APP_NAME),
            name,
        ))
    }

    /// Directories under a single storage root
    #[must_use]
    pub fn under(root: &Path, name: &str) -> Self {
        Self::from_bases(&root.join("cache"), &root.join("config"), &root.join("data"), name)
    }

    fn from_bases(cache: &Path, config: &Path, data: &Path, name: &str) -> Self {
        Self {
            cache: cache.join(name),
            config: config.join(name),
            data: data.join(name),
            archive: data.join("archives").join(name),
            models: data.join("models").join(name),
        }
    }

    /// Create all five directories; already existing ones are fine
    pub fn create_all(&self) -> Result<()> {
        for dir in [&self.cache, &self.config, &self.data, &self.archive, &self.models] {
            fs::create_dir_all(dir).map_err(|e| {
                BergamotError::FileSystem(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    /// Directory holding a model, addressed by catalog code
    #[must_use]
    pub fn model_dir(&self, code: &str) -> PathBuf {
        self.models.join(code)
    }

    /// Path of the engine config for a model, whether or not it exists yet
    #[must_use]
    pub fn model_config_path(&self, code: &str) -> PathBuf {
        self.model_dir(code).join(ENGINE_CONFIG_FILE)
    }

    /// Advisory lock file guarding downloads of one model
    #[must_use]
    pub fn lock_path(&self, code: &str) -> PathBuf {
        self.cache.join("locks").join(format!("{code}.lock"))
    }
}

/// Directory name an archive unpacks into: its URL basename minus compression suffixes
pub fn archive_stem(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| BergamotError::Parse(format!("Invalid archive URL '{url}': {e}")))?;

    let basename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| basename.strip_suffix(suffix))
        .unwrap_or(basename);

    if is_safe_component(stem) {
        Ok(stem.to_string())
    } else {
        Err(BergamotError::Parse(format!(
            "Archive URL '{url}' has no usable file name"
        )))
    }
}

/// Whether a name can be used as a single path component under a provider directory
#[must_use]
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
