//! Retriever configuration.
//!
//! Settings come from an optional TOML file in which every section and field
//! may be omitted, overlaid with environment variables, then validated once.
//!
//! ```toml
//! registry = "rulebook.db"
//!
//! [qdrant]
//! url = "http://localhost:6333"
//! collection = "poker_rules"
//! allow_recreate = true
//!
//! [chunking]
//! max_tokens = 1100
//! overlap_tokens = 180
//!
//! [ingest]
//! batch_size = 32
//! token_ceiling = 7900
//!
//! [search]
//! k_raw = 40
//! k_final = 12
//! max_per_doc = 3
//!
//! [evidence]
//! max_per_doc = 2
//! limit_docs = 6
//!
//! [[doc_boosts]]
//! pattern = "ropta"
//! doc_id = "ROPTA-2025-02.pdf"
//! boost = 1.25
//! ```
//!
//! Environment overrides: `QDRANT_URL`, `QDRANT_COLLECTION`, `QDRANT_API_KEY`,
//! `RULEBOOK_REGISTRY`.

use crate::boost::DocBoostRule;
use crate::error::{Result, RetrieverError};
use crate::evidence::EvidenceOptions;
use crate::search::SearchOptions;
use rulebook_ai_context::ChunkOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    /// Rebuild the collection when its vector size differs from the model's.
    pub allow_recreate: bool,
    pub timeout_secs: u64,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "poker_rules".to_string(),
            api_key: None,
            allow_recreate: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Chunks per embedding request.
    pub batch_size: usize,
    /// Hard per-chunk token limit of the embedding model.
    pub token_ceiling: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 32,
            token_ceiling: 7900,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub qdrant: QdrantSettings,
    pub chunking: ChunkOptions,
    pub ingest: IngestSettings,
    pub search: SearchOptions,
    pub evidence: EvidenceOptions,
    pub doc_boosts: Vec<DocBoostRule>,
    /// SQLite file recording ingested revisions; disabled when unset.
    pub registry: Option<PathBuf>,
}

impl RetrieverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrieverError::config(e.to_string()))
    }

    /// Load `path` (or defaults when `None`), apply the process environment
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`RetrieverConfig::load`] with a custom variable source.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    RetrieverError::config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Overlay non-empty environment values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("QDRANT_URL") {
            self.qdrant.url = url;
        }
        if let Some(collection) = get("QDRANT_COLLECTION") {
            self.qdrant.collection = collection;
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(key);
        }
        if let Some(path) = get("RULEBOOK_REGISTRY") {
            self.registry = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.qdrant.collection.trim().is_empty() {
            return Err(RetrieverError::config("qdrant.collection is empty"));
        }
        if self.ingest.batch_size == 0 {
            return Err(RetrieverError::config("ingest.batch_size must be positive"));
        }
        if self.ingest.token_ceiling < self.chunking.max_tokens {
            return Err(RetrieverError::config(format!(
                "ingest.token_ceiling ({}) is below chunking.max_tokens ({})",
                self.ingest.token_ceiling, self.chunking.max_tokens
            )));
        }
        self.search.validate()?;
        self.evidence.validate()?;
        for rule in &self.doc_boosts {
            rule.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = RetrieverConfig::load_with(None, no_env).unwrap();

        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert_eq!(config.qdrant.collection, "poker_rules");
        assert!(config.qdrant.allow_recreate);
        assert_eq!(config.chunking, ChunkOptions::new(1100, 180));
        assert_eq!(config.ingest, IngestSettings::default());
        assert_eq!(config.search.k_raw, 40);
        assert_eq!(config.search.k_final, 12);
        assert_eq!(config.search.max_per_doc, 3);
        assert_eq!(config.evidence.max_total, 8);
        assert!(config.doc_boosts.is_empty());
        assert_eq!(config.registry, None);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = RetrieverConfig::from_toml_str(
            r#"
            registry = "rules.db"

            [qdrant]
            collection = "rules_v2"
            allow_recreate = false

            [search]
            k_final = 8

            [[doc_boosts]]
            pattern = "\\btda\\b|tournament directors"
            doc_id = "reglement-et-legislation-poker.pdf"
            boost = 1.15
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.qdrant.collection, "rules_v2");
        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert!(!config.qdrant.allow_recreate);
        assert_eq!(config.search.k_final, 8);
        assert_eq!(config.search.k_raw, 40);
        assert_eq!(config.doc_boosts.len(), 1);
        assert_eq!(config.registry, Some(PathBuf::from("rules.db")));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[qdrant]\nurl = \"http://file:6333\"\ncollection = \"from_file\"").unwrap();

        let env: HashMap<&str, &str> = [
            ("QDRANT_URL", "http://env:6333"),
            ("QDRANT_COLLECTION", " "),
            ("QDRANT_API_KEY", "secret"),
            ("RULEBOOK_REGISTRY", "/tmp/registry.db"),
        ]
        .into_iter()
        .collect();

        let config =
            RetrieverConfig::load_with(Some(file.path()), |k| env.get(k).map(|v| v.to_string()))
                .unwrap();

        assert_eq!(config.qdrant.url, "http://env:6333");
        assert_eq!(config.qdrant.collection, "from_file");
        assert_eq!(config.qdrant.api_key.as_deref(), Some("secret"));
        assert_eq!(config.registry, Some(PathBuf::from("/tmp/registry.db")));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            "[chunking]\nmax_tokens = 100\noverlap_tokens = 100",
            "[ingest]\nbatch_size = 0",
            "[ingest]\ntoken_ceiling = 500",
            "[search]\nk_raw = 12\nk_final = 12",
            "[search]\nmax_per_doc = 0",
            "[evidence]\nmax_total = 0",
            "[evidence]\nmax_total = 9",
            "[[doc_boosts]]\npattern = \"(\"\ndoc_id = \"a\"\nboost = 1.2",
            "[[doc_boosts]]\npattern = \"a\"\ndoc_id = \"a\"\nboost = 0.0",
            "[qdrant]\ncollection = \"\"",
        ];
        for case in cases {
            let config = RetrieverConfig::from_toml_str(case).unwrap();
            assert!(config.validate().is_err(), "accepted: {case}");
        }

        assert!(RetrieverConfig::from_toml_str("[search]\nk_raw = \"many\"").is_err());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let sample = include_str!("../../demos/rulebook.example.toml");
        let config = RetrieverConfig::from_toml_str(sample).unwrap();
        config.validate().unwrap();

        let expected = RetrieverConfig {
            doc_boosts: config.doc_boosts.clone(),
            registry: Some(PathBuf::from("rulebook.db")),
            ..RetrieverConfig::default()
        };
        assert_eq!(config, expected);
        assert_eq!(config.doc_boosts[0].doc_id, "ROPTA-2025-02.pdf");
        assert_eq!(config.doc_boosts[1].boost, 1.15);
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = RetrieverConfig::load_with(Some(Path::new("/nonexistent/rulebook.toml")), no_env)
            .unwrap_err();
        assert!(matches!(err, RetrieverError::Config { .. }));
    }
}
