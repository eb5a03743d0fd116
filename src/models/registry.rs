use crate::error::{BergamotError, Result};
use crate::models::archive::{self, find_training_config};
use crate::models::catalog::{Catalog, CatalogEntry, ModelSource, SharedCatalog};
use crate::models::download::ResourceFetcher;
use crate::models::layout::{archive_stem, is_safe_component, ProviderDirectories};
use crate::models::lock::ModelLock;
use crate::models::patch::{write_atomic, ConfigPatcher};
use crate::models::provider::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw listing saved after every update
pub const SNAPSHOT_FILE: &str = "models.json";

/// Top-level shape of a translateLocally-style `models.json`
#[derive(Debug, Deserialize)]
struct Listing {
    models: Vec<RegistryRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryRecord {
    code: String,
    name: String,
    short_name: String,
    url: String,
    src: Option<String>,
    trg: Option<String>,
    checksum: Option<String>,
    version: Option<serde_json::Value>,
}

impl From<RegistryRecord> for CatalogEntry {
    fn from(record: RegistryRecord) -> Self {
        let version = record
            .version
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        Self {
            code: record.code,
            name: record.name,
            short_name: record.short_name,
            src: record.src,
            trg: record.trg,
            source: ModelSource::Archive {
                url: record.url,
                checksum: record.checksum,
                version,
            },
        }
    }
}

/// Provider backed by a JSON catalog with one archive per model
pub struct RegistryProvider {
    name: String,
    url: String,
    dirs: ProviderDirectories,
    fetcher: ResourceFetcher,
    catalog: SharedCatalog,
    patcher: ConfigPatcher,
}

impl std::fmt::Debug for RegistryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryProvider")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("models", &self.dirs.models)
            .field("catalog_len", &self.catalog.snapshot().len())
            .finish()
    }
}

impl RegistryProvider {
    /// Create provider; its directories are created immediately
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        dirs: ProviderDirectories,
        fetcher: ResourceFetcher,
    ) -> Result<Self> {
        dirs.create_all()?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            dirs,
            fetcher,
            catalog: SharedCatalog::default(),
            patcher: ConfigPatcher::new(),
        })
    }

    /// Patch engine configs with the quality-estimation keys as well
    #[must_use]
    pub fn with_quality(mut self, quality: bool) -> Self {
        self.patcher = self.patcher.with_quality(quality);
        self
    }

    /// Where the last fetched listing is kept
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dirs.config.join(SNAPSHOT_FILE)
    }

    async fn fetch_and_extract(&self, entry: &CatalogEntry, url: &str, stem: &str) -> Result<()> {
        let archive_path = self
            .dirs
            .archive
            .join(format!("{}.tar.gz", entry.short_name));

        tracing::info!(
            "Downloading and extracting {} into {}",
            entry.code,
            self.dirs.models.join(stem).display()
        );

        self.fetcher.fetch(url, &archive_path, false).await?;

        // Unpack beside the models so nothing partial is ever visible under models/<stem>
        let staging = self.dirs.models.join(format!(".{}.incomplete", entry.code));
        if staging.exists() {
            tracing::debug!("Removing leftover {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }

        let result = self.unpack_into_place(&archive_path, &staging, stem).await;
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }
        result?;

        link_model(&self.dirs.models, stem, &entry.code)
    }

    async fn unpack_into_place(&self, archive_path: &Path, staging: &Path, stem: &str) -> Result<()> {
        fs::create_dir_all(staging)?;
        archive::extract(archive_path, staging).await?;

        let unpacked = staging.join(stem);
        if !unpacked.is_dir() {
            return Err(BergamotError::Archive(format!(
                "{} did not contain a top-level '{stem}' directory",
                archive_path.display()
            )));
        }

        let target = self.dirs.models.join(stem);
        if target.is_dir() {
            tracing::debug!("{} already unpacked, keeping it", target.display());
            return Ok(());
        }

        fs::rename(&unpacked, &target).map_err(|e| {
            BergamotError::FileSystem(format!(
                "Failed to move {} into place: {e}",
                unpacked.display()
            ))
        })
    }
}

/// Parse a `models.json` listing into a catalog
pub fn parse_listing(raw: &str) -> Result<Catalog> {
    let listing: Listing = serde_json::from_str(raw)
        .map_err(|e| BergamotError::Parse(format!("Invalid model listing: {e}")))?;

    if let Some(bad) = listing
        .models
        .iter()
        .find(|record| !is_safe_component(&record.short_name))
    {
        return Err(BergamotError::Parse(format!(
            "Model '{}' has an unusable shortName '{}'",
            bad.code, bad.short_name
        )));
    }

    Catalog::from_entries(listing.models.into_iter().map(CatalogEntry::from))
}

/// Point `models/<code>` at the extracted `models/<stem>` directory
///
/// An existing link is accepted when it already targets the stem, either
/// relatively or absolutely.
fn link_model(models: &Path, stem: &str, code: &str) -> Result<()> {
    if stem == code {
        return Ok(());
    }

    let link = models.join(code);
    if link.symlink_metadata().is_ok() {
        return check_link(models, &link, stem);
    }

    match std::os::unix::fs::symlink(stem, &link) {
        Ok(()) => {
            tracing::debug!("Linked {} -> {stem}", link.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => check_link(models, &link, stem),
        Err(e) => Err(BergamotError::FileSystem(format!(
            "Failed to link {} -> {stem}: {e}",
            link.display()
        ))),
    }
}

fn check_link(models: &Path, link: &Path, stem: &str) -> Result<()> {
    match fs::read_link(link) {
        Ok(target) if target == Path::new(stem) || target == models.join(stem) => Ok(()),
        Ok(target) => Err(BergamotError::FileSystem(format!(
            "{} points at {} instead of {stem}",
            link.display(),
            target.display()
        ))),
        Err(e) => Err(BergamotError::FileSystem(format!(
            "{} exists and is not a symlink: {e}",
            link.display()
        ))),
    }
}

#[async_trait]
impl Provider for RegistryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn directories(&self) -> &ProviderDirectories {
        &self.dirs
    }

    fn catalog(&self) -> Arc<Catalog> {
        self.catalog.snapshot()
    }

    async fn update(&self) -> Result<()> {
        let raw = self.fetcher.fetch_text(&self.url).await?;
        write_atomic(&self.snapshot_path(), &raw)?;

        let catalog = parse_listing(&raw)?;
        tracing::info!("{}: {} models listed", self.name, catalog.len());
        self.catalog.replace(catalog);
        Ok(())
    }

    async fn download(&self, code: &str) -> Result<()> {
        let entry = self.model(code)?;
        let ModelSource::Archive { url, .. } = &entry.source else {
            return Err(BergamotError::Parse(format!(
                "Model '{code}' is not distributed as an archive"
            )));
        };
        let stem = archive_stem(url)?;

        let _lock = ModelLock::acquire(self.dirs.lock_path(code)).await?;

        let model_dir = self.dirs.model_dir(code);
        if model_dir.is_dir() {
            tracing::debug!("{code} already extracted at {}", model_dir.display());
        } else {
            self.fetch_and_extract(&entry, url, &stem).await?;
        }

        let config_path = self.model_config_path(code);
        if !config_path.exists() {
            let training_config = find_training_config(&model_dir)?;
            self.patcher.patch_file(&training_config, &config_path)?;
            tracing::info!("Prepared {}", config_path.display());
        }

        Ok(())
    }
}
