use crate::error::Result;
use crate::models::catalog::{Catalog, CatalogEntry};
use crate::models::layout::ProviderDirectories;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Unified interface for model providers
///
/// Implementors supply their catalog, directories and the two network-bound
/// operations; lookups and on-disk naming are shared.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used as the aggregator key
    fn name(&self) -> &str;

    /// Directories this provider stores its files in
    fn directories(&self) -> &ProviderDirectories;

    /// Current in-memory catalog
    fn catalog(&self) -> Arc<Catalog>;

    /// Refetch the model listing and replace the catalog
    ///
    /// The raw listing is saved to the config directory. On failure the
    /// previous catalog stays in place.
    async fn update(&self) -> Result<()>;

    /// Fetch and unpack a model so its engine config exists on disk
    ///
    /// Calling this again after a success does not refetch or re-extract.
    async fn download(&self, code: &str) -> Result<()>;

    /// Model codes in catalog order, optionally only the downloaded ones
    fn models(&self, filter_downloaded: bool) -> Vec<String> {
        self.catalog()
            .entries()
            .filter(|entry| !filter_downloaded || self.is_downloaded(&entry.code))
            .map(|entry| entry.code.clone())
            .collect()
    }

    /// Catalog entry for a code
    fn model(&self, code: &str) -> Result<CatalogEntry> {
        self.catalog().require(self.name(), code).cloned()
    }

    /// Where the engine config for `code` lives once downloaded
    fn model_config_path(&self, code: &str) -> PathBuf {
        self.directories().model_config_path(code)
    }

    /// Whether the model directory for `code` exists
    fn is_downloaded(&self, code: &str) -> bool {
        self.directories().model_dir(code).is_dir()
    }
}
