use crate::config::SearchDefaults;

/// Options for pure semantic search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum results returned.
    pub limit: usize,
    /// Records scoring below this cosine similarity are dropped.
    pub min_score: f32,
    /// Restrict to one `metadata.type`.
    pub type_filter: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_defaults(&SearchDefaults::default())
    }
}

impl SearchOptions {
    /// Options seeded from configured defaults.
    pub fn from_defaults(defaults: &SearchDefaults) -> Self {
        Self {
            limit: defaults.limit,
            min_score: defaults.min_score,
            type_filter: None,
        }
    }

    /// Set the result limit. Chainable builder method.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the minimum score. Chainable builder method.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restrict to one record type. Chainable builder method.
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.type_filter = Some(kind.into());
        self
    }
}

/// Options for hybrid (vector + keyword) search.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchOptions {
    /// Maximum results returned.
    pub limit: usize,
    /// Records whose fused score is below this are dropped.
    pub min_score: f32,
    /// Restrict to one `metadata.type`.
    pub type_filter: Option<String>,
    /// Multiplier on the vector score.
    pub vector_weight: f32,
    /// Multiplier on the keyword score.
    pub keyword_weight: f32,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self::from_defaults(&SearchDefaults::default())
    }
}

impl HybridSearchOptions {
    /// Options seeded from configured defaults.
    pub fn from_defaults(defaults: &SearchDefaults) -> Self {
        Self {
            limit: defaults.limit,
            min_score: defaults.hybrid_min_score,
            type_filter: None,
            vector_weight: defaults.vector_weight,
            keyword_weight: defaults.keyword_weight,
        }
    }

    /// Set the result limit. Chainable builder method.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the minimum fused score. Chainable builder method.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restrict to one record type. Chainable builder method.
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.type_filter = Some(kind.into());
        self
    }

    /// Set both fusion weights. Weights need not sum to 1.
    pub fn with_weights(mut self, vector_weight: f32, keyword_weight: f32) -> Self {
        self.vector_weight = vector_weight;
        self.keyword_weight = keyword_weight;
        self
    }
}
