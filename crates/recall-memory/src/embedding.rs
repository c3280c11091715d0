use async_trait::async_trait;
use recall_core::{RecallError, RecallResult};
use std::collections::HashMap;

use crate::config::EmbeddingConfig;
use crate::keyword::normalize_words;

/// Trait for computing text embeddings (vector representations).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> RecallResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> RecallResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Cheap liveness check. Providers without a remote side are always up.
    async fn probe(&self) -> bool {
        true
    }

    /// Apply new endpoint/model settings. The default only validates shape.
    fn configure(&self, config: &EmbeddingConfig) -> RecallResult<()> {
        config.validate()
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Words shorter than this carry no signal for the local embedder.
///
/// Lower than the keyword index's threshold: two-letter terms such as "ai"
/// or "go" are too common to index but still move the vector.
const MIN_WORD_CHARS: usize = 2;

/// Hash seed and weight of each bucket a word is spread over.
const PROBES: [(Option<u8>, f32); 3] = [(None, 1.0), (Some(1), 0.7), (Some(2), 0.5)];

/// Deterministic in-process embedder (no external API needed).
///
/// Words come from [`normalize_words`], the same normalization the keyword
/// index uses, so text that tokenizes alike embeds alike. Each word's term
/// frequency is spread over three hashed buckets and the vector is
/// L2-normalized. Text without any usable word embeds as the zero vector,
/// which scores 0 against everything.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create an embedder producing vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, word: &str, seed: Option<u8>) -> usize {
        fnv1a(word.bytes().chain(seed)) as usize % self.dimension
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> RecallResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RecallError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for word in normalize_words(text) {
            if word.chars().count() >= MIN_WORD_CHARS {
                *term_counts.entry(word).or_insert(0) += 1;
                total += 1;
            }
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (word, count) in &term_counts {
            let tf = *count as f32 / total as f32;
            for (seed, weight) in PROBES {
                vector[self.bucket(word, seed)] += tf * weight;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 32-bit FNV-1a.
fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u32 {
    bytes.into_iter().fold(2_166_136_261, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(16_777_619)
    })
}
