//! Hybrid memory search engine.
//!
//! Stores free-text memories with their embeddings in an append-only JSONL
//! log and answers queries by combining cosine similarity with keyword
//! overlap.
//!
//! # Main types
//!
//! - [`MemoryEngine`]: Store handle: add, search, delete and maintenance.
//! - [`RecordStore`]: Append-only JSONL log with atomic rewrite on delete.
//! - [`KeywordIndex`]: Inverted index from normalized tokens to record ids.
//! - [`EmbeddingProvider`]: Trait for embedding clients; [`LocalEmbedding`]
//!   is the deterministic in-process implementation.
//! - [`MemoryConfig`]: TOML-loadable configuration.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> recall_core::RecallResult<()> {
//! use std::sync::Arc;
//! use recall_memory::{HybridSearchOptions, LocalEmbedding, MemoryEngine};
//!
//! let engine = MemoryEngine::open("./data/memories.jsonl", Arc::new(LocalEmbedding::default())).await?;
//! let mut meta = serde_json::Map::new();
//! meta.insert("type".into(), "preference".into());
//! engine.add("I like coffee in the morning", meta).await?;
//!
//! let results = engine.hybrid_search("coffee morning", &HybridSearchOptions::default()).await?;
//! for hit in results.iter() {
//!     println!("{:.2} {}", hit.fused_score, hit.record.content);
//! }
//! # Ok(())
//! # }
//! ```

/// Bounded id-to-embedding cache.
pub mod cache;
/// Engine and embedding configuration.
pub mod config;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Store handle, write path and query coordination.
pub mod engine;
/// OpenAI-compatible HTTP embedding client.
#[cfg(feature = "http-embeddings")]
pub mod http_embedding;
/// Inverted keyword index.
pub mod keyword;
/// Statistics, index rebuild, export/import and clear.
pub mod maintenance;
/// Search option builders.
pub mod query;
/// Record model and scored results.
pub mod record;
/// Similarity and fusion functions.
pub mod similarity;
/// Append-only JSONL record log.
pub mod store;

pub use cache::EmbeddingCache;
pub use config::{EmbeddingBackend, EmbeddingConfig, MemoryConfig, SearchDefaults};
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use engine::MemoryEngine;
#[cfg(feature = "http-embeddings")]
pub use http_embedding::HttpEmbedding;
pub use keyword::{normalize_words, tokenize, KeywordHit, KeywordIndex};
pub use maintenance::{ImportMode, MemoryStats, RebuildReport};
pub use query::{HybridSearchOptions, SearchOptions};
pub use record::{MatchKind, MemoryRecord, RecordMetadata, ScoredRecord, SearchResults, DEFAULT_TYPE};
pub use similarity::{cosine_similarity, fuse};
pub use store::{RecordScan, RecordStore};
