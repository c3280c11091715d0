use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use recall_core::{RecallError, RecallResult};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::config::{EmbeddingBackend, MemoryConfig, SearchDefaults};
use crate::embedding::{EmbeddingProvider, LocalEmbedding};
use crate::keyword::{KeywordHit, KeywordIndex};
use crate::query::{HybridSearchOptions, SearchOptions};
use crate::record::{derive_id, MatchKind, MemoryRecord, RecordMetadata, ScoredRecord, SearchResults};
use crate::similarity::{cosine_similarity, fuse};
use crate::store::RecordStore;

/// Handle to one memory store: the write path, semantic and hybrid search,
/// and (see the maintenance methods) administrative operations.
///
/// The engine keeps a live [`KeywordIndex`] for [`keyword_search`] that is
/// updated on every write. Hybrid search does not use it: each query builds
/// its own index from the same scan it scores, so results never depend on
/// index staleness.
///
/// [`keyword_search`]: MemoryEngine::keyword_search
pub struct MemoryEngine {
    pub(crate) store: RecordStore,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) index: RwLock<KeywordIndex>,
    pub(crate) cache: EmbeddingCache,
    pub(crate) defaults: SearchDefaults,
    pub(crate) embed_timeout: parking_lot::RwLock<Duration>,
}

impl MemoryEngine {
    /// Open the store at `path` with default settings.
    pub async fn open(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> RecallResult<Self> {
        Self::with_config(MemoryConfig::with_store_path(path), embedder).await
    }

    /// Open a store using `config`, with an embedding client built from
    /// `config.embedding`.
    pub async fn from_config(config: MemoryConfig) -> RecallResult<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            EmbeddingBackend::Local => Arc::new(LocalEmbedding::new(config.embedding.dimension)),
            #[cfg(feature = "http-embeddings")]
            EmbeddingBackend::Http => Arc::new(crate::http_embedding::HttpEmbedding::new(
                config.embedding.clone(),
            )?),
            #[cfg(not(feature = "http-embeddings"))]
            EmbeddingBackend::Http => {
                return Err(RecallError::Config(
                    "http embeddings require the `http-embeddings` feature".into(),
                ))
            }
        };
        Self::with_config(config, embedder).await
    }

    /// Open a store using `config` and a caller-supplied embedding client.
    pub async fn with_config(
        config: MemoryConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> RecallResult<Self> {
        config.validate()?;
        let store = RecordStore::open(config.store_path.clone()).await?;
        let records = store.load(None).await?;
        let index = KeywordIndex::build(&records);
        info!(
            path = %config.store_path.display(),
            records = records.len(),
            "memory store opened"
        );

        Ok(Self {
            store,
            embedder,
            index: RwLock::new(index),
            cache: EmbeddingCache::new(config.cache_capacity),
            defaults: config.search,
            embed_timeout: parking_lot::RwLock::new(config.embedding.timeout()),
        })
    }

    /// Release the handle. Every write is already durable, so this only
    /// drops in-memory state.
    pub fn close(self) {
        debug!(path = %self.store.path().display(), "memory store closed");
    }

    /// The underlying record log.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Semantic search options seeded from this engine's configuration.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::from_defaults(&self.defaults)
    }

    /// Hybrid search options seeded from this engine's configuration.
    pub fn hybrid_options(&self) -> HybridSearchOptions {
        HybridSearchOptions::from_defaults(&self.defaults)
    }

    /// Embed and persist a new memory, returning its id.
    ///
    /// `metadata` may carry a string `type` (default `"general"`) and any
    /// other caller fields. Fails if the embedding provider is unavailable.
    pub async fn add(
        &self,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> RecallResult<String> {
        if content.trim().is_empty() {
            return Err(RecallError::InvalidInput(
                "memory content must not be empty".into(),
            ));
        }

        let created_at = Utc::now();
        let metadata = RecordMetadata::from_caller(metadata, created_at)?;
        let embedding = self.embed_bounded(content).await?;

        let id = {
            let index = self.index.read().await;
            let mut nonce = 0u32;
            loop {
                let candidate = derive_id(content, created_at, nonce);
                if !index.contains(&candidate) {
                    break candidate;
                }
                nonce += 1;
            }
        };

        let record = MemoryRecord {
            id: id.clone(),
            content: content.to_string(),
            embedding,
            metadata,
        };
        self.store.append(&record).await?;
        self.index.write().await.add(&record);
        self.cache.insert(&record.id, record.embedding);
        debug!(id = %id, kind = %record.metadata.kind, "memory added");
        Ok(id)
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: &str) -> RecallResult<Option<MemoryRecord>> {
        let mut scan = self.store.scan(None).await?;
        while let Some(record) = scan.next_record().await? {
            if record.id == id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Embedding of a stored record, served from the cache when possible.
    pub async fn get_embedding(&self, id: &str) -> RecallResult<Option<Vec<f32>>> {
        if let Some(embedding) = self.cache.get(id) {
            return Ok(Some(embedding));
        }
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        self.cache.insert(id, record.embedding.clone());
        Ok(Some(record.embedding))
    }

    /// Delete a record. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> RecallResult<bool> {
        let found = self.store.delete(id).await?;
        self.index.write().await.remove(id);
        self.cache.remove(id);
        Ok(found)
    }

    /// Pure keyword lookup against the live index.
    pub async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Vec<KeywordHit> {
        self.index.read().await.search(query, limit, type_filter)
    }

    /// Rank records by cosine similarity to `query` alone.
    ///
    /// If the embedding provider is unreachable or times out the result is
    /// empty and flagged `degraded`. Any other embedding error is returned.
    pub async fn search_memories(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> RecallResult<SearchResults> {
        if query.trim().is_empty() || options.limit == 0 {
            return Ok(SearchResults::default());
        }

        let query_embedding = match self.embed_bounded(query).await {
            Ok(embedding) => embedding,
            Err(e) if e.is_provider_unavailable() => {
                warn!(error = %e, "embedding unavailable, semantic search degraded");
                return Ok(SearchResults {
                    records: Vec::new(),
                    degraded: true,
                });
            }
            Err(e) => return Err(e),
        };

        let records = self.store.load(options.type_filter.as_deref()).await?;
        let mut scored: Vec<ScoredRecord> = records
            .into_iter()
            .filter_map(|record| {
                let score = cosine_similarity(&query_embedding, &record.embedding);
                (score >= options.min_score).then_some(ScoredRecord {
                    record,
                    vector_score: score,
                    keyword_score: 0.0,
                    match_kind: None,
                    fused_score: score,
                })
            })
            .collect();

        rank(&mut scored, options.limit);
        Ok(SearchResults {
            records: scored,
            degraded: false,
        })
    }

    /// Rank records by a weighted blend of cosine similarity and keyword
    /// overlap.
    ///
    /// If the embedding provider is unreachable or times out, every vector
    /// score is zero and ranking falls back to keywords alone; the result is
    /// flagged `degraded`. Any other embedding error is returned.
    pub async fn hybrid_search(
        &self,
        query: &str,
        options: &HybridSearchOptions,
    ) -> RecallResult<SearchResults> {
        if query.trim().is_empty() || options.limit == 0 {
            return Ok(SearchResults::default());
        }
        let type_filter = options.type_filter.as_deref();

        let records = self.store.load(type_filter).await?;

        // Oversample keyword hits so strong lexical matches survive until fusion.
        let index = KeywordIndex::build(&records);
        let keyword_scores: HashMap<String, (f32, MatchKind)> = index
            .search(query, options.limit.saturating_mul(2), type_filter)
            .into_iter()
            .map(|hit| (hit.id, (hit.overlap_score, hit.match_kind)))
            .collect();

        let (query_embedding, degraded) = match self.embed_bounded(query).await {
            Ok(embedding) => (Some(embedding), false),
            Err(e) if e.is_provider_unavailable() => {
                warn!(error = %e, "embedding unavailable, falling back to keyword-only scoring");
                (None, true)
            }
            Err(e) => return Err(e),
        };

        let mut scored: Vec<ScoredRecord> = records
            .into_iter()
            .filter_map(|record| {
                let vector_score = query_embedding
                    .as_deref()
                    .map_or(0.0, |q| cosine_similarity(q, &record.embedding));
                let (keyword_score, match_kind) = keyword_scores
                    .get(&record.id)
                    .map_or((0.0, None), |(score, kind)| (*score, Some(*kind)));
                let fused_score = fuse(
                    vector_score,
                    keyword_score,
                    options.vector_weight,
                    options.keyword_weight,
                );
                (fused_score >= options.min_score).then_some(ScoredRecord {
                    record,
                    vector_score,
                    keyword_score,
                    match_kind,
                    fused_score,
                })
            })
            .collect();

        rank(&mut scored, options.limit);
        debug!(
            results = scored.len(),
            degraded,
            "hybrid search complete"
        );
        Ok(SearchResults {
            records: scored,
            degraded,
        })
    }

    /// Embed `text`, treating a slow provider as a failed one.
    pub(crate) async fn embed_bounded(&self, text: &str) -> RecallResult<Vec<f32>> {
        let timeout = *self.embed_timeout.read();
        match tokio::time::timeout(timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(RecallError::EmbeddingTimeout(timeout.as_millis() as u64)),
        }
    }
}

/// Sort by fused score descending, keeping scan order among equal scores,
/// then truncate.
fn rank(scored: &mut Vec<ScoredRecord>, limit: usize) {
    scored.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
}
