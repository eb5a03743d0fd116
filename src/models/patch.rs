//! Rewrites training configs into the profile the local engine runs with.
//!
//! Upstream configs are written for a server deployment (large workspaces,
//! sentence-level splitting). The overrides below pin the values bergamot
//! expects; every other key is passed through untouched and in order.

use crate::error::{BergamotError, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Keys forced on every engine config
pub const ENGINE_OVERRIDES: &[(&str, Override)] = &[
    ("ssplit-prefix-file", Override::Str("")),
    ("ssplit-mode", Override::Str("paragraph")),
    ("max-length-break", Override::Int(128)),
    ("mini-batch-words", Override::Int(1024)),
    ("workspace", Override::Int(128)),
    ("alignment", Override::Str("soft")),
];

/// Keys forced additionally when quality estimation is requested
pub const QUALITY_OVERRIDES: &[(&str, Override)] = &[
    ("quality", Override::Bool(true)),
    ("skip-cost", Override::Bool(false)),
];

/// A fixed value written over a config key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    Str(&'static str),
    Int(u64),
    Bool(bool),
}

impl Override {
    fn to_value(self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.to_string()),
            Self::Int(n) => Value::Number(n.into()),
            Self::Bool(b) => Value::Bool(b),
        }
    }
}

/// Applies the engine overrides to raw configs
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPatcher {
    quality: bool,
}

impl ConfigPatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also force the quality-estimation keys
    #[must_use]
    pub fn with_quality(mut self, quality: bool) -> Self {
        self.quality = quality;
        self
    }

    /// Patch a mapping in place of its overridden keys
    ///
    /// Existing keys keep their position, missing ones are appended.
    #[must_use]
    pub fn patch(&self, mut config: Mapping) -> Mapping {
        let quality: &[(&str, Override)] = if self.quality { QUALITY_OVERRIDES } else { &[] };

        for (key, value) in ENGINE_OVERRIDES.iter().chain(quality) {
            config.insert(Value::String((*key).to_string()), value.to_value());
        }
        config
    }

    /// Parse YAML text, patch it and serialize it back
    pub fn patch_str(&self, raw: &str) -> Result<String> {
        let value: Value = serde_yaml::from_str(raw)
            .map_err(|e| BergamotError::Parse(format!("Invalid YAML config: {e}")))?;

        let Value::Mapping(mapping) = value else {
            return Err(BergamotError::Parse(
                "Config is not a key-value mapping".to_string(),
            ));
        };

        render(&self.patch(mapping))
    }

    /// Patch `input` into a new file at `output`; `input` is left untouched
    pub fn patch_file(&self, input: &Path, output: &Path) -> Result<()> {
        let raw = fs::read_to_string(input)?;
        let patched = self
            .patch_str(&raw)
            .map_err(|e| match e {
                BergamotError::Parse(msg) => {
                    BergamotError::Parse(format!("{}: {msg}", input.display()))
                }
                other => other,
            })?;

        write_atomic(output, &patched)?;
        tracing::debug!("Patched {} -> {}", input.display(), output.display());
        Ok(())
    }
}

/// Serialize a config mapping as YAML
pub fn render(config: &Mapping) -> Result<String> {
    serde_yaml::to_string(config)
        .map_err(|e| BergamotError::Parse(format!("Failed to serialize config: {e}")))
}

/// Write a file atomically (tmp + rename)
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
