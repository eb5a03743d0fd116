pub mod process;

use crate::config::EngineConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use process::ProcessEngine;

/// Settings the translation service is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub num_workers: usize,
    /// GPU device indices; empty runs on CPU
    pub gpu_devices: Vec<usize>,
    /// Translation cache entries, 0 disables the cache
    pub cache_size: usize,
    /// trace, debug, info, warn, err(or), critical, off
    pub log_level: String,
    /// TSV file of forced term translations
    pub terminology: Option<PathBuf>,
    pub force_terminology: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ServiceConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            num_workers: config.num_workers,
            gpu_devices: config.gpu_devices.clone(),
            cache_size: config.cache_size,
            log_level: config.log_level.clone(),
            terminology: config.terminology.clone(),
            force_terminology: config.force_terminology,
        }
    }
}

/// What a response carries besides the translated text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    pub alignment: bool,
    pub quality_scores: bool,
    /// Input is HTML; markup is carried over to the target
    pub html: bool,
}

/// Translation of one input
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub source: String,
    pub target: String,
    /// Per target token, soft alignment over source tokens
    pub alignments: Option<Vec<Vec<f32>>>,
    pub quality_scores: Option<Vec<f32>>,
}

/// Narrow interface to the translation engine
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Handle to a loaded model
    type Model: Send + Sync;

    /// Load a model from its `config.bergamot.yml`
    async fn load_model(&self, config_path: &Path) -> Result<Self::Model>;

    /// Translate a batch of inputs, one response per input
    async fn translate(
        &self,
        model: &Self::Model,
        inputs: &[String],
        options: &ResponseOptions,
    ) -> Result<Vec<Response>>;

    /// Translate through an intermediate language
    async fn pivot(
        &self,
        first: &Self::Model,
        second: &Self::Model,
        inputs: &[String],
        options: &ResponseOptions,
    ) -> Result<Vec<Response>> {
        let intermediate = self
            .translate(first, inputs, &ResponseOptions::default())
            .await?;
        let pivots: Vec<String> = intermediate.into_iter().map(|r| r.target).collect();

        let mut responses = self.translate(second, &pivots, options).await?;
        for (response, source) in responses.iter_mut().zip(inputs) {
            response.source.clone_from(source);
        }
        Ok(responses)
    }

    /// Get engine name for logging/debugging
    fn engine_name(&self) -> &str;
}
