use crate::config::{Config, ProviderKind};
use crate::error::{BergamotError, Result};
use crate::models::catalog::CatalogEntry;
use crate::models::download::ResourceFetcher;
use crate::models::layout::{is_safe_component, ProviderDirectories};
use crate::models::manifest::ManifestProvider;
use crate::models::provider::Provider;
use crate::models::registry::RegistryProvider;
use std::collections::HashMap;
use std::path::PathBuf;

/// Routes model operations to providers by name
pub struct Aggregator {
    providers: Vec<Box<dyn Provider>>,
    by_name: HashMap<String, usize>,
    default: usize,
    fallback_to_default: bool,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("providers", &self.available())
            .field("default", &self.default_provider())
            .field("fallback_to_default", &self.fallback_to_default)
            .finish()
    }
}

impl Aggregator {
    /// Create aggregator; the first provider is the default
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(BergamotError::Config(
                "At least one model provider is required".to_string(),
            ));
        }

        let mut by_name = HashMap::with_capacity(providers.len());
        for (i, provider) in providers.iter().enumerate() {
            if by_name.insert(provider.name().to_string(), i).is_some() {
                return Err(BergamotError::Conflict(format!(
                    "Duplicate provider name '{}'",
                    provider.name()
                )));
            }
        }

        Ok(Self {
            providers,
            by_name,
            default: 0,
            fallback_to_default: false,
        })
    }

    /// Build every provider declared in config
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = ResourceFetcher::new(&config.network)?;

        let mut providers: Vec<Box<dyn Provider>> = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            if !is_safe_component(&provider.name) {
                return Err(BergamotError::Config(format!(
                    "Provider name '{}' cannot be used as a directory name",
                    provider.name
                )));
            }

            let dirs = match &config.storage.root {
                Some(root) => ProviderDirectories::under(root, &provider.name),
                None => ProviderDirectories::for_provider(&provider.name)?,
            };

            let built: Box<dyn Provider> = match provider.kind {
                ProviderKind::Registry => Box::new(RegistryProvider::new(
                    provider.name.clone(),
                    provider.url.clone(),
                    dirs,
                    fetcher.clone(),
                )?
                .with_quality(config.engine.quality)),
                ProviderKind::Manifest => Box::new(ManifestProvider::new(
                    provider.name.clone(),
                    provider.url.clone(),
                    dirs,
                    fetcher.clone(),
                )?
                .with_quality(config.engine.quality)),
            };
            providers.push(built);
        }

        Ok(Self::new(providers)?
            .with_default(&config.default_provider)?
            .with_fallback(config.fallback_to_default))
    }

    /// Designate the default provider
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        self.default = *self.by_name.get(name).ok_or_else(|| {
            BergamotError::NotFound(format!(
                "Default provider '{name}' is not registered (available: {})",
                self.available().join(", ")
            ))
        })?;
        Ok(self)
    }

    /// Send unknown provider names to the default provider instead of failing
    #[must_use]
    pub fn with_fallback(mut self, fallback_to_default: bool) -> Self {
        self.fallback_to_default = fallback_to_default;
        self
    }

    /// Registered provider names, in registration order
    #[must_use]
    pub fn available(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Name of the default provider
    #[must_use]
    pub fn default_provider(&self) -> &str {
        self.providers[self.default].name()
    }

    /// Resolve a provider by name
    pub fn provider(&self, name: &str) -> Result<&dyn Provider> {
        if let Some(&i) = self.by_name.get(name) {
            return Ok(self.providers[i].as_ref());
        }

        if self.fallback_to_default {
            tracing::warn!(
                "Unknown provider '{name}', using default '{}'",
                self.default_provider()
            );
            return Ok(self.providers[self.default].as_ref());
        }

        Err(BergamotError::NotFound(format!(
            "Provider '{name}' is not registered (available: {})",
            self.available().join(", ")
        )))
    }

    /// Refresh one provider's catalog
    pub async fn update(&self, name: &str) -> Result<()> {
        self.provider(name)?.update().await
    }

    /// Model codes of one provider
    pub fn models(&self, name: &str, filter_downloaded: bool) -> Result<Vec<String>> {
        Ok(self.provider(name)?.models(filter_downloaded))
    }

    /// Catalog entry of one model
    pub fn model(&self, name: &str, code: &str) -> Result<CatalogEntry> {
        self.provider(name)?.model(code)
    }

    /// Engine config path of one model
    pub fn model_config_path(&self, name: &str, code: &str) -> Result<PathBuf> {
        Ok(self.provider(name)?.model_config_path(code))
    }

    /// Materialize one model
    pub async fn download(&self, name: &str, code: &str) -> Result<()> {
        self.provider(name)?.download(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{Catalog, ModelSource};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct StubProvider {
        name: String,
        dirs: ProviderDirectories,
        catalog: Arc<Catalog>,
    }

    impl StubProvider {
        fn boxed(name: &str) -> Box<dyn Provider> {
            let entry = CatalogEntry {
                code: format!("{name}-model"),
                name: format!("{name} model"),
                short_name: name.to_string(),
                src: None,
                trg: None,
                source: ModelSource::Archive {
                    url: format!("https://{name}.example.com/m.tar.gz"),
                    checksum: None,
                    version: None,
                },
            };
            Box::new(Self {
                name: name.to_string(),
                dirs: ProviderDirectories::under(Path::new("/nonexistent"), name),
                catalog: Arc::new(Catalog::from_entries(vec![entry]).unwrap()),
            })
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn directories(&self) -> &ProviderDirectories {
            &self.dirs
        }

        fn catalog(&self) -> Arc<Catalog> {
            Arc::clone(&self.catalog)
        }

        async fn update(&self) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _code: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_names_conflict() {
        let err = Aggregator::new(vec![
            StubProvider::boxed("browsermt"),
            StubProvider::boxed("opus"),
            StubProvider::boxed("browsermt"),
        ])
        .unwrap_err();
        assert!(matches!(err, BergamotError::Conflict(_)));
    }

    #[test]
    fn test_available_in_registration_order() {
        let aggregator = Aggregator::new(vec![
            StubProvider::boxed("opus"),
            StubProvider::boxed("browsermt"),
            StubProvider::boxed("mozilla"),
        ])
        .unwrap();

        assert_eq!(aggregator.available(), vec!["opus", "browsermt", "mozilla"]);
        assert_eq!(aggregator.default_provider(), "opus");
    }

    #[test]
    fn test_empty_aggregator_rejected() {
        assert!(matches!(Aggregator::new(Vec::new()), Err(BergamotError::Config(_))));
    }

    #[test]
    fn test_routes_by_name() {
        let aggregator =
            Aggregator::new(vec![StubProvider::boxed("browsermt"), StubProvider::boxed("opus")])
                .unwrap();

        assert_eq!(aggregator.models("opus", false).unwrap(), vec!["opus-model"]);
        assert_eq!(aggregator.model("opus", "opus-model").unwrap().name, "opus model");
        assert!(matches!(
            aggregator.model("opus", "browsermt-model"),
            Err(BergamotError::NotFound(_))
        ));
        assert_eq!(
            aggregator.model_config_path("browsermt", "x").unwrap(),
            PathBuf::from("/nonexistent/data/models/browsermt/x/config.bergamot.yml")
        );
    }

    #[test]
    fn test_unknown_provider_is_not_found() {
        let aggregator = Aggregator::new(vec![StubProvider::boxed("browsermt")]).unwrap();

        let err = aggregator.models("browsermtt", false).unwrap_err();
        assert!(matches!(err, BergamotError::NotFound(_)));
        assert!(err.to_string().contains("available: browsermt"));
    }

    #[test]
    fn test_fallback_when_opted_in() {
        let aggregator =
            Aggregator::new(vec![StubProvider::boxed("browsermt"), StubProvider::boxed("opus")])
                .unwrap()
                .with_default("opus")
                .unwrap()
                .with_fallback(true);

        assert_eq!(aggregator.models("typo", false).unwrap(), vec!["opus-model"]);
    }

    #[test]
    fn test_unknown_default_rejected() {
        let err = Aggregator::new(vec![StubProvider::boxed("browsermt")])
            .unwrap()
            .with_default("opus")
            .unwrap_err();
        assert!(matches!(err, BergamotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_async_operations_delegate() {
        let aggregator = Aggregator::new(vec![StubProvider::boxed("browsermt")]).unwrap();
        aggregator.update("browsermt").await.unwrap();
        aggregator.download("browsermt", "browsermt-model").await.unwrap();
        assert!(aggregator.download("nope", "x").await.is_err());
    }
}
