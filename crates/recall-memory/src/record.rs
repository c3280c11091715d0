use chrono::{DateTime, SecondsFormat, Utc};
use recall_core::{RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Category tag given to records added without an explicit `type`.
pub const DEFAULT_TYPE: &str = "general";

/// Number of hex characters kept from the SHA-256 digest.
const ID_LEN: usize = 16;

/// Metadata attached to a [`MemoryRecord`].
///
/// `type` and `timestamp` are always present. Any other keys supplied by the
/// caller are carried in `extra` and written back out untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Category tag, used by type-filtered scans.
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Caller-defined fields the engine never interprets.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

impl RecordMetadata {
    /// Build metadata from a caller-supplied map.
    ///
    /// A string `type` entry becomes the category (blank or absent means
    /// [`DEFAULT_TYPE`]); a caller `timestamp` is replaced by `created_at`.
    /// A non-string `type` is rejected, since it has nowhere to live once the
    /// category takes the key.
    pub fn from_caller(
        mut fields: serde_json::Map<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> RecallResult<Self> {
        let kind = match fields.remove("type") {
            None | Some(serde_json::Value::Null) => default_type(),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => default_type(),
            Some(serde_json::Value::String(s)) => s,
            Some(other) => {
                return Err(RecallError::InvalidInput(format!(
                    "metadata.type must be a string, got {other}"
                )))
            }
        };
        fields.remove("timestamp");
        Ok(Self {
            kind,
            timestamp: created_at,
            extra: fields,
        })
    }
}

/// A single stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Content-derived identifier, unique among live records.
    pub id: String,
    /// The remembered text. Never mutated after creation.
    pub content: String,
    /// Embedding computed from `content` at creation time.
    pub embedding: Vec<f32>,
    /// Category, creation instant and caller fields.
    pub metadata: RecordMetadata,
}

impl MemoryRecord {
    /// The record's category tag.
    pub fn kind(&self) -> &str {
        &self.metadata.kind
    }

    /// Whether this record passes an optional type filter.
    pub fn matches_type(&self, type_filter: Option<&str>) -> bool {
        type_filter.map_or(true, |t| self.metadata.kind == t)
    }
}

/// Derive a record id from its content and creation instant.
///
/// `nonce` is zero for the first attempt and is only bumped by the store when
/// the derived id is already taken.
pub fn derive_id(content: &str, created_at: DateTime<Utc>, nonce: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(
        created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    if nonce > 0 {
        hasher.update(nonce.to_le_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// How completely a record matched the query keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Every query token is present in the record.
    Exact,
    /// At least one, but not every, query token is present.
    Partial,
}

/// A record annotated with its component and fused scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: MemoryRecord,
    /// Cosine similarity between the query and record embeddings.
    pub vector_score: f32,
    /// Fraction of query tokens found in the record.
    pub keyword_score: f32,
    /// Keyword match quality, `None` when no query token matched.
    pub match_kind: Option<MatchKind>,
    /// Score used for ranking.
    pub fused_score: f32,
}

/// Ranked output of a search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    /// Matches, best first.
    pub records: Vec<ScoredRecord>,
    /// Set when the embedding provider was unavailable and vector scores
    /// were forced to zero.
    pub degraded: bool,
}

impl SearchResults {
    /// Number of matches.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over matches, best first.
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRecord> {
        self.records.iter()
    }

    /// Ids of the matches, best first.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.record.id.as_str()).collect()
    }
}

impl IntoIterator for SearchResults {
    type Item = ScoredRecord;
    type IntoIter = std::vec::IntoIter<ScoredRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
