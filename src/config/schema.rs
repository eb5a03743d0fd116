use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Route unknown provider names to the default provider instead of failing
    #[serde(default)]
    pub fallback_to_default: bool,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct StorageConfig {
    /// Keep every provider directory under this root instead of the platform dirs
    pub root: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Abort a download when no data arrives for this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub cache_size: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub gpu_devices: Vec<usize>,
    pub terminology: Option<PathBuf>,
    #[serde(default)]
    pub force_terminology: bool,
    /// Prepare downloaded models for quality estimation
    #[serde(default)]
    pub quality: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// JSON catalog, one archive per model
    Registry,
    /// Scraped model registry script, one file set per model
    Manifest,
}

// Default value functions
fn default_provider() -> String {
    "browsermt".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    format!("bergamot-models/{}", env!("CARGO_PKG_VERSION"))
}
fn default_engine_binary() -> String {
    "bergamot".to_string()
}
fn default_num_workers() -> usize {
    4
}
fn default_log_level() -> String {
    "off".to_string()
}
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "browsermt".to_string(),
            kind: ProviderKind::Registry,
            url: "https://translatelocally.com/models.json".to_string(),
        },
        ProviderConfig {
            name: "opus".to_string(),
            kind: ProviderKind::Registry,
            url: "https://object.pouta.csc.fi/OPUS-MT-models/app/models.json".to_string(),
        },
        ProviderConfig {
            name: "mozilla".to_string(),
            kind: ProviderKind::Manifest,
            url: "https://gist.githubusercontent.com/jerinphilip/f9bc31d70e4201771b7734ab1cfd1205/raw/d2ddd8ddb822695f1ee2ccccbb12e9c0daeeabbf/mozilla-models.json".to_string(),
        },
    ]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            show_progress: default_true(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            num_workers: default_num_workers(),
            cache_size: 0,
            log_level: default_log_level(),
            gpu_devices: Vec::new(),
            terminology: None,
            force_terminology: false,
            quality: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            fallback_to_default: false,
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            engine: EngineConfig::default(),
            providers: default_providers(),
        }
    }
}
