use crate::error::{BergamotError, Result};
use crate::models::layout::is_safe_component;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One model as listed by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: String,
    pub name: String,
    pub short_name: String,
    pub src: Option<String>,
    pub trg: Option<String>,
    pub source: ModelSource,
}

/// Where a model's files come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A single archive holding weights, vocabularies and a training config
    Archive {
        url: String,
        checksum: Option<String>,
        version: Option<u32>,
    },
    /// Separately hosted files, no config shipped
    FileSet(FileSet),
}

/// The files making up a manifest-listed model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    pub root_url: String,
    pub model: String,
    pub vocab: String,
    pub lex: String,
}

impl FileSet {
    /// File names in download order
    #[must_use]
    pub fn files(&self) -> [&str; 3] {
        [self.vocab.as_str(), self.model.as_str(), self.lex.as_str()]
    }

    /// Remote location of one file of the set
    #[must_use]
    pub fn url_for(&self, code: &str, file: &str) -> String {
        format!("{}/{code}/{file}", self.root_url.trim_end_matches('/'))
    }
}

/// Ordered model listing with a code index
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog in listing order
    ///
    /// A code that repeats is kept at its first position; later duplicates are dropped.
    pub fn from_entries(listing: impl IntoIterator<Item = CatalogEntry>) -> Result<Self> {
        let mut catalog = Self::default();

        for entry in listing {
            if !is_safe_component(&entry.code) {
                return Err(BergamotError::Parse(format!(
                    "Model code '{}' cannot be used as a directory name",
                    entry.code
                )));
            }
            if catalog.by_code.contains_key(&entry.code) {
                tracing::warn!("Duplicate model code '{}' in listing, keeping the first", entry.code);
                continue;
            }
            catalog.by_code.insert(entry.code.clone(), catalog.entries.len());
            catalog.entries.push(entry);
        }

        Ok(catalog)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in listing order
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    /// Look up an entry by code
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(code).map(|&i| &self.entries[i])
    }

    /// Look up an entry, failing with a suggestion when the code is unknown
    pub fn require(&self, provider: &str, code: &str) -> Result<&CatalogEntry> {
        self.get(code).ok_or_else(|| {
            let hint = self
                .suggest(code)
                .map(|s| format!(". Did you mean '{s}'?"))
                .unwrap_or_default();
            BergamotError::NotFound(format!(
                "Model '{code}' is not listed by provider '{provider}'{hint}"
            ))
        })
    }

    /// Find closest code using Levenshtein distance
    #[must_use]
    pub fn suggest(&self, code: &str) -> Option<&str> {
        if code.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .map(|e| (e.code.as_str(), levenshtein_distance(code, &e.code)))
            .min_by_key(|(_, dist)| *dist)
            .filter(|(_, dist)| *dist <= 2) // Only suggest if within 2 edits
            .map(|(code, _)| code)
    }
}

/// Catalog slot replaced wholesale on every update
#[derive(Debug, Default)]
pub struct SharedCatalog {
    inner: RwLock<Arc<Catalog>>,
}

impl SharedCatalog {
    /// Current catalog
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a freshly built catalog
    pub fn replace(&self, catalog: Catalog) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }
}

/// Calculate Levenshtein distance between two strings
#[allow(clippy::needless_range_loop)]
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for i in 0..=len1 {
        matrix[i][0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for (i, c1) in s1.chars().enumerate() {
        for (j, c2) in s2.chars().enumerate() {
            let cost = usize::from(c1 != c2);
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[len1][len2]
}
