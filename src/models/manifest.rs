//! Provider for model registries published as generated scripts.
//!
//! The registry maps a direction code (`enit`, `ende`) to the files making
//! up that model. Files are grouped by the key they are listed under, never
//! by the language pair in their names: en→X models reuse the X→en vocab.
//! A JSON-shaped asset is read with serde; a script is scanned for its
//! `modelRegistry` object. Either way the parser fails closed: a direction
//! without a model, vocab and lex file rejects the whole listing.

use crate::error::{BergamotError, Result};
use crate::models::catalog::{Catalog, CatalogEntry, FileSet, ModelSource, SharedCatalog};
use crate::models::download::ResourceFetcher;
use crate::models::layout::{ProviderDirectories, ENGINE_CONFIG_FILE};
use crate::models::lock::ModelLock;
use crate::models::patch::{render, write_atomic, ConfigPatcher};
use crate::models::provider::Provider;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw registry script saved after every update
pub const SNAPSHOT_FILE: &str = "modelRegistry.js";

/// Quantization the published weights are prepared for
const GEMM_PRECISION: &str = "int8shiftAlphaAll";

const ROOT_URL_PATTERN: &str = r#"modelRegistryRootURL["']?\s*[:=]\s*["']([^"']+)["']"#;
const REGISTRY_START_PATTERN: &str = r#"modelRegistry["']?\s*[:=]\s*\{"#;
/// `key: {` opens an object, `key: "value"` is a string field
const TOKEN_PATTERN: &str = r#"["']?([A-Za-z_][A-Za-z0-9_]*)["']?\s*:\s*(?:\{|["']([^"']*)["'])"#;

/// JSON shape of the registry asset
#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(rename = "modelRegistryRootURL")]
    root_url: String,
    #[serde(rename = "modelRegistry")]
    registry: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FileRecord {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DirectionFiles {
    model: Option<FileRecord>,
    vocab: Option<FileRecord>,
    lex: Option<FileRecord>,
}

impl DirectionFiles {
    fn slot(&mut self, kind: &str) -> Option<&mut Option<FileRecord>> {
        match kind {
            "model" => Some(&mut self.model),
            "vocab" => Some(&mut self.vocab),
            "lex" => Some(&mut self.lex),
            _ => None,
        }
    }
}

/// Parse a model registry (script or JSON) into a catalog
pub fn parse_registry(raw: &str) -> Result<Catalog> {
    let (root_url, directions) = match serde_json::from_str::<RegistryDocument>(raw) {
        Ok(document) => read_document(document)?,
        Err(e) => {
            tracing::debug!("Registry is not JSON ({e}), scanning it as a script");
            scan_script(raw)?
        }
    };

    if directions.is_empty() {
        return Err(BergamotError::Parse("Registry lists no models".to_string()));
    }

    let mut entries = Vec::with_capacity(directions.len());
    for (code, files) in directions {
        let missing = |what: &str| {
            BergamotError::Parse(format!("Direction '{code}' has no {what} file"))
        };
        let file_set = FileSet {
            root_url: root_url.clone(),
            model: files.model.ok_or_else(|| missing("model"))?.name,
            vocab: files.vocab.ok_or_else(|| missing("vocab"))?.name,
            lex: files.lex.ok_or_else(|| missing("lex"))?.name,
        };
        entries.push(entry_for(code, file_set));
    }

    Catalog::from_entries(entries)
}

fn read_document(document: RegistryDocument) -> Result<(String, Vec<(String, DirectionFiles)>)> {
    let mut directions = Vec::with_capacity(document.registry.len());
    for (code, payload) in document.registry {
        let files: DirectionFiles = serde_json::from_value(payload).map_err(|e| {
            BergamotError::Parse(format!("Direction '{code}' is malformed: {e}"))
        })?;
        directions.push((code, files));
    }
    Ok((document.root_url, directions))
}

/// Walk the `modelRegistry` object of a script, tracking brace depth
///
/// Depth 1 keys are directions, depth 2 keys are file kinds and depth 3
/// `name` fields are file names.
fn scan_script(raw: &str) -> Result<(String, Vec<(String, DirectionFiles)>)> {
    let root_url = compile(ROOT_URL_PATTERN)?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BergamotError::Parse("No modelRegistryRootURL in registry".to_string()))?;

    let start = compile(REGISTRY_START_PATTERN)?
        .find(raw)
        .ok_or_else(|| BergamotError::Parse("No modelRegistry object in registry".to_string()))?
        .end();
    let body = &raw[start..];

    let mut directions: Vec<(String, DirectionFiles)> = Vec::new();
    let mut kind: Option<String> = None;
    let mut depth = 1usize;
    let mut cursor = 0;

    for caps in compile(TOKEN_PATTERN)?.captures_iter(body) {
        let Some(token) = caps.get(0) else { continue };
        for c in body[cursor..token.start()].chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if depth == 0 {
            break;
        }
        cursor = token.end();

        let key = &caps[1];
        match (depth, caps.get(2)) {
            (1, None) => directions.push((key.to_string(), DirectionFiles::default())),
            (2, None) => kind = Some(key.to_string()),
            (3, Some(value)) if key == "name" => {
                let (Some((code, files)), Some(kind)) = (directions.last_mut(), kind.as_deref())
                else {
                    continue;
                };
                if let Some(slot) = files.slot(kind) {
                    if let Some(existing) = slot.as_ref() {
                        tracing::warn!(
                            "{code}: ignoring second {kind} file '{}', keeping '{}'",
                            value.as_str(),
                            existing.name
                        );
                    } else {
                        *slot = Some(FileRecord {
                            name: value.as_str().to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
        if caps.get(2).is_none() {
            depth += 1;
        }
    }

    Ok((root_url, directions))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| BergamotError::Parse(format!("Bad pattern {pattern}: {e}")))
}

/// A four-letter lowercase code reads as `<src><trg>`
fn language_pair(code: &str) -> Option<(&str, &str)> {
    (code.len() == 4 && code.chars().all(|c| c.is_ascii_lowercase()))
        .then(|| code.split_at(2))
}

fn entry_for(code: String, files: FileSet) -> CatalogEntry {
    let (src, trg) = match language_pair(&code) {
        Some((src, trg)) => (Some(src.to_string()), Some(trg.to_string())),
        None => (None, None),
    };
    let name = match (&src, &trg) {
        (Some(src), Some(trg)) => format!("{src} → {trg}"),
        _ => code.clone(),
    };

    CatalogEntry {
        short_name: code.clone(),
        code,
        name,
        src,
        trg,
        source: ModelSource::FileSet(files),
    }
}

/// Engine config for a file set, before the engine overrides are applied
fn engine_config_template(files: &FileSet) -> Mapping {
    let mut config = Mapping::new();
    config.insert("models".into(), Value::Sequence(vec![files.model.as_str().into()]));
    config.insert(
        "vocabs".into(),
        Value::Sequence(vec![files.vocab.as_str().into(), files.vocab.as_str().into()]),
    );
    config.insert(
        "shortlist".into(),
        Value::Sequence(vec![files.lex.as_str().into(), Value::Bool(false)]),
    );
    config.insert("gemm-precision".into(), GEMM_PRECISION.into());
    config
}

/// Provider backed by a scraped model registry, fetching files individually
pub struct ManifestProvider {
    name: String,
    url: String,
    dirs: ProviderDirectories,
    fetcher: ResourceFetcher,
    catalog: SharedCatalog,
    patcher: ConfigPatcher,
}

impl std::fmt::Debug for ManifestProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestProvider")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("models", &self.dirs.models)
            .field("catalog_len", &self.catalog.snapshot().len())
            .finish()
    }
}

impl ManifestProvider {
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

    /// Write engine configs with the quality-estimation keys as well
    #[must_use]
    pub fn with_quality(mut self, quality: bool) -> Self {
        self.patcher = self.patcher.with_quality(quality);
        self
    }

    /// Where the last fetched registry script is kept
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dirs.config.join(SNAPSHOT_FILE)
    }

    /// Fetch every file of the set into `dir` and write the engine config there
    async fn materialize(&self, code: &str, files: &FileSet, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        for file in files.files() {
            self.fetcher
                .fetch(&files.url_for(code, file), &dir.join(file), false)
                .await?;
        }

        self.write_engine_config(files, &dir.join(ENGINE_CONFIG_FILE))
    }

    fn write_engine_config(&self, files: &FileSet, path: &Path) -> Result<()> {
        let config = self.patcher.patch(engine_config_template(files));
        write_atomic(path, &render(&config)?)
    }
}

#[async_trait]
impl Provider for ManifestProvider {
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

        let catalog = parse_registry(&raw)?;
        tracing::info!("{}: {} models listed", self.name, catalog.len());
        self.catalog.replace(catalog);
        Ok(())
    }

    async fn download(&self, code: &str) -> Result<()> {
        let entry = self.model(code)?;
        let ModelSource::FileSet(files) = &entry.source else {
            return Err(BergamotError::Parse(format!(
                "Model '{code}' is not distributed as a file set"
            )));
        };

        let _lock = ModelLock::acquire(self.dirs.lock_path(code)).await?;

        let model_dir = self.dirs.model_dir(code);
        let config_path = model_dir.join(ENGINE_CONFIG_FILE);
        if config_path.exists() {
            tracing::debug!("{code} already present at {}", model_dir.display());
            return Ok(());
        }
        if model_dir.is_dir() {
            return self.write_engine_config(files, &config_path);
        }

        // Files land in a staging directory that only becomes the model directory once complete
        let staging = self.dirs.models.join(format!(".{code}.incomplete"));
        tracing::info!("Downloading {code} into {}", model_dir.display());
        self.materialize(code, files, &staging).await?;
        fs::rename(&staging, &model_dir).map_err(|e| {
            BergamotError::FileSystem(format!(
                "Failed to move {} into place: {e}",
                staging.display()
            ))
        })?;

        tracing::info!("Prepared {}", config_path.display());
        Ok(())
    }
}
