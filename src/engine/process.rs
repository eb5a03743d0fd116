use crate::engine::{Response, ResponseOptions, ServiceConfig, TranslationEngine};
use crate::error::{BergamotError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Engine driven through the `bergamot` command-line app
///
/// Every translate call runs the binary in native mode once per input,
/// feeding the text on stdin and reading the translation from stdout.
/// The app reports text only, so alignment and quality scores stay empty.
#[derive(Debug)]
pub struct ProcessEngine {
    binary: PathBuf,
    config: ServiceConfig,
}

/// A model the process engine will load on each run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessModel {
    config_path: PathBuf,
}

impl ProcessModel {
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl ProcessEngine {
    /// Create engine for a binary name or path
    ///
    /// # Errors
    /// - Returns error if the binary cannot be found
    pub fn new(binary: &str, config: ServiceConfig) -> Result<Self> {
        let binary = which::which(binary).map_err(|_| {
            BergamotError::Engine(format!("{binary} binary not found in PATH"))
        })?;

        if config.terminology.is_some() {
            tracing::warn!("Terminology files are not passed to the command-line engine");
        }

        Ok(Self { binary, config })
    }

    fn args(&self, model: &ProcessModel) -> Vec<String> {
        let mut args = vec![
            "--model-config-paths".to_string(),
            model.config_path.display().to_string(),
            "--cpu-threads".to_string(),
            self.config.num_workers.to_string(),
            "--log-level".to_string(),
            self.config.log_level.clone(),
            "--bergamot-mode".to_string(),
            "native".to_string(),
        ];

        if self.config.cache_size > 0 {
            args.push("--cache-size".to_string());
            args.push(self.config.cache_size.to_string());
        }
        if !self.config.gpu_devices.is_empty() {
            args.push("--devices".to_string());
            args.extend(self.config.gpu_devices.iter().map(ToString::to_string));
        }

        args
    }

    async fn run(&self, model: &ProcessModel, input: &str) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(self.args(model))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BergamotError::Engine(format!("Failed to spawn {}: {e}", self.binary.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BergamotError::Engine("Engine stdin not available".to_string()))?;
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| BergamotError::Engine(format!("Failed to write input: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BergamotError::Engine(format!("Engine did not finish: {e}")))?;

        if !output.status.success() {
            return Err(BergamotError::Engine(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TranslationEngine for ProcessEngine {
    type Model = ProcessModel;

    async fn load_model(&self, config_path: &Path) -> Result<ProcessModel> {
        if !config_path.is_file() {
            return Err(BergamotError::NotFound(format!(
                "Engine config {} does not exist. Download the model first:\n  bergamot download -m <code>",
                config_path.display()
            )));
        }

        Ok(ProcessModel {
            config_path: config_path.to_path_buf(),
        })
    }

    async fn translate(
        &self,
        model: &ProcessModel,
        inputs: &[String],
        options: &ResponseOptions,
    ) -> Result<Vec<Response>> {
        if options.alignment || options.quality_scores || options.html {
            tracing::warn!("{} ignores alignment, quality and HTML options", self.engine_name());
        }

        let mut responses = Vec::with_capacity(inputs.len());
        for input in inputs {
            let target = self.run(model, input).await?;
            responses.push(Response {
                source: input.clone(),
                target,
                alignments: None,
                quality_scores: None,
            });
        }
        Ok(responses)
    }

    fn engine_name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_missing_binary() {
        let err = ProcessEngine::new("bergamot-definitely-not-installed", ServiceConfig::default())
            .unwrap_err();
        assert!(matches!(err, BergamotError::Engine(_)));
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[test]
    fn test_args() {
        let engine = ProcessEngine {
            binary: PathBuf::from("/usr/bin/bergamot"),
            config: ServiceConfig {
                num_workers: 2,
                gpu_devices: vec![0, 1],
                cache_size: 1000,
                log_level: "info".to_string(),
                terminology: None,
                force_terminology: false,
            },
        };
        let model = ProcessModel {
            config_path: PathBuf::from("/m/ende-tiny/config.bergamot.yml"),
        };

        assert_eq!(
            engine.args(&model),
            vec![
                "--model-config-paths",
                "/m/ende-tiny/config.bergamot.yml",
                "--cpu-threads",
                "2",
                "--log-level",
                "info",
                "--bergamot-mode",
                "native",
                "--cache-size",
                "1000",
                "--devices",
                "0",
                "1",
            ]
        );
    }

    #[tokio::test]
    async fn test_load_model_requires_config() {
        let temp_dir = TempDir::new().unwrap();
        let engine = ProcessEngine {
            binary: PathBuf::from("/bin/sh"),
            config: ServiceConfig::default(),
        };

        let err = engine
            .load_model(&temp_dir.path().join("config.bergamot.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, BergamotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_translate_and_pivot_through_process() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("config.bergamot.yml");
        fs::write(&config, "models: []\n").unwrap();
        let exclaim = script(temp_dir.path(), "exclaim", "printf '%s!' \"$(cat)\"");
        let failing = script(temp_dir.path(), "failing", "echo broken >&2; exit 3");

        let engine = ProcessEngine::new(exclaim.to_str().unwrap(), ServiceConfig::default()).unwrap();
        let model = engine.load_model(&config).await.unwrap();

        let inputs = vec!["hallo".to_string(), "welt".to_string()];
        let responses = engine
            .translate(&model, &inputs, &ResponseOptions::default())
            .await
            .unwrap();
        let targets: Vec<&str> = responses.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["hallo!", "welt!"]);

        let pivoted = engine
            .pivot(&model, &model, &inputs[..1], &ResponseOptions::default())
            .await
            .unwrap();
        assert_eq!(pivoted[0].source, "hallo");
        assert_eq!(pivoted[0].target, "hallo!!");

        let engine = ProcessEngine::new(failing.to_str().unwrap(), ServiceConfig::default()).unwrap();
        let err = engine
            .translate(&model, &inputs, &ResponseOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
