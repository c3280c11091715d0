use std::path::{Path, PathBuf};
use std::time::Duration;

use recall_core::{RecallError, RecallResult};
use serde::{Deserialize, Serialize};

/// Which embedding client to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic in-process hashing embedder.
    #[default]
    Local,
    /// OpenAI-compatible HTTP endpoint.
    Http,
}

/// Embedding client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Client kind.
    #[serde(default)]
    pub provider: EmbeddingBackend,
    /// Base URL of the embeddings API, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model name sent with each request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Expected vector length.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Upper bound on a single embedding call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            endpoint: None,
            model: default_model(),
            api_key: None,
            dimension: default_dimension(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl EmbeddingConfig {
    /// Shape-only validation. Connectivity is never checked here.
    pub fn validate(&self) -> RecallResult<()> {
        if self.model.trim().is_empty() {
            return Err(RecallError::Config("embedding model must not be empty".into()));
        }
        if self.dimension == 0 {
            return Err(RecallError::Config("embedding dimension must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(RecallError::Config("embedding timeout must be > 0".into()));
        }
        match (&self.endpoint, self.provider) {
            (Some(url), _) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                Err(RecallError::Config(format!(
                    "embedding endpoint must be an http(s) URL, got '{url}'"
                )))
            }
            (None, EmbeddingBackend::Http) => Err(RecallError::Config(
                "http embedding provider requires an endpoint".into(),
            )),
            _ => Ok(()),
        }
    }

    /// The call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default search parameters, overridable per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDefaults {
    /// Maximum results returned.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum vector score for semantic search.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Minimum fused score for hybrid search.
    #[serde(default = "default_hybrid_min_score")]
    pub hybrid_min_score: f32,
    /// Weight of the vector score in hybrid search.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    /// Weight of the keyword score in hybrid search.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_score: default_min_score(),
            hybrid_min_score: default_hybrid_min_score(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

/// Top-level engine configuration, usually read from a TOML file.
///
/// ```toml
/// store_path = "./data/memories.jsonl"
/// cache_capacity = 2048
///
/// [search]
/// limit = 10
///
/// [embedding]
/// provider = "http"
/// endpoint = "http://localhost:11434/v1"
/// model = "nomic-embed-text"
/// dimension = 768
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// JSONL log location.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Search defaults.
    #[serde(default)]
    pub search: SearchDefaults,
    /// Embedding client settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Maximum embeddings held by the in-memory cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            search: SearchDefaults::default(),
            embedding: EmbeddingConfig::default(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl MemoryConfig {
    /// Config with defaults and the given log location.
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: path.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> RecallResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| RecallError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> RecallResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            RecallError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&data)
    }

    /// Check value ranges.
    pub fn validate(&self) -> RecallResult<()> {
        self.embedding.validate()?;
        let s = &self.search;
        if s.limit == 0 {
            return Err(RecallError::Config("search.limit must be > 0".into()));
        }
        for (name, value) in [
            ("search.vector_weight", s.vector_weight),
            ("search.keyword_weight", s.keyword_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecallError::Config(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimension() -> usize {
    256
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_limit() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.3
}
fn default_hybrid_min_score() -> f32 {
    0.2
}
fn default_vector_weight() -> f32 {
    0.6
}
fn default_keyword_weight() -> f32 {
    0.4
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/memories.jsonl")
}
fn default_cache_capacity() -> usize {
    1024
}
