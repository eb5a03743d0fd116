pub mod archive;
pub mod catalog;
pub mod download;
pub mod layout;
pub mod lock;
pub mod manager;
pub mod manifest;
pub mod patch;
pub mod provider;
pub mod registry;

pub use catalog::{Catalog, CatalogEntry, FileSet, ModelSource};
pub use download::{FetchOutcome, ResourceFetcher};
pub use layout::{ProviderDirectories, ENGINE_CONFIG_FILE};
pub use manager::Aggregator;
pub use manifest::ManifestProvider;
pub use patch::ConfigPatcher;
pub use provider::Provider;
pub use registry::RegistryProvider;
