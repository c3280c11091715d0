use std::collections::{HashMap, HashSet};

use crate::record::{MatchKind, MemoryRecord};

/// Tokens at or below this many characters are not indexed.
const MIN_TOKEN_CHARS: usize = 2;

/// Lowercase `text`, strip every character that is neither alphanumeric nor
/// whitespace, and split on whitespace. No length filter is applied.
pub fn normalize_words(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Normalize text into index tokens.
///
/// [`normalize_words`], then drop tokens of two characters or fewer.
/// "Don't" becomes `dont`; "AI" is dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize_words(text)
        .into_iter()
        .filter(|w| w.chars().count() > MIN_TOKEN_CHARS)
        .collect()
}

/// One keyword search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    /// Record id.
    pub id: String,
    /// Number of distinct query tokens found in the record.
    pub matches: usize,
    /// `matches / total query tokens`.
    pub overlap_score: f32,
    /// Whether every query token matched.
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone)]
struct Posting {
    kind: String,
    seq: u64,
}

/// In-memory inverted index from normalized tokens to record ids.
///
/// Derived entirely from record content and always rebuildable from a scan
/// of the store; losing it only costs keyword-score contribution.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    /// token -> ids whose content contains it
    postings: HashMap<String, HashSet<String>>,
    /// id -> category and insertion sequence
    docs: HashMap<String, Posting>,
    next_seq: u64,
}

impl KeywordIndex {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over `records`, in order.
    pub fn build<'a>(records: impl IntoIterator<Item = &'a MemoryRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.add(record);
        }
        index
    }

    /// Index one record. Re-adding a known id merges its tokens and keeps
    /// its original position.
    pub fn add(&mut self, record: &MemoryRecord) {
        for token in tokenize(&record.content) {
            self.postings
                .entry(token)
                .or_default()
                .insert(record.id.clone());
        }
        if !self.docs.contains_key(&record.id) {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.docs.insert(
                record.id.clone(),
                Posting {
                    kind: record.metadata.kind.clone(),
                    seq,
                },
            );
        }
    }

    /// Excise every posting for `id`. Returns whether the id was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.docs.remove(id).is_none() {
            return false;
        }
        self.postings.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
        true
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Number of distinct tokens.
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    /// Find records sharing tokens with `query`.
    ///
    /// Results are ordered by match count descending, then by insertion
    /// order, and truncated to `limit`.
    pub fn search(&self, query: &str, limit: usize, type_filter: Option<&str>) -> Vec<KeywordHit> {
        let mut seen = HashSet::new();
        let query_tokens: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if query_tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &query_tokens {
            if let Some(ids) = self.postings.get(token) {
                for id in ids {
                    *counts.entry(id.as_str()).or_insert(0) += 1;
                }
            }
        }

        let total = query_tokens.len();
        let mut hits: Vec<(u64, KeywordHit)> = counts
            .into_iter()
            .filter_map(|(id, matches)| {
                let doc = self.docs.get(id)?;
                if type_filter.is_some_and(|t| doc.kind != t) {
                    return None;
                }
                let match_kind = if matches == total {
                    MatchKind::Exact
                } else {
                    MatchKind::Partial
                };
                Some((
                    doc.seq,
                    KeywordHit {
                        id: id.to_string(),
                        matches,
                        overlap_score: matches as f32 / total as f32,
                        match_kind,
                    },
                ))
            })
            .collect();

        hits.sort_by(|(seq_a, a), (seq_b, b)| b.matches.cmp(&a.matches).then(seq_a.cmp(seq_b)));
        hits.truncate(limit);
        hits.into_iter().map(|(_, hit)| hit).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::RecordMetadata;
    use chrono::Utc;

    fn record(id: &str, content: &str, kind: &str) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            content: content.to_string(),
            embedding: Vec::new(),
            metadata: RecordMetadata {
                kind: kind.to_string(),
                timestamp: Utc::now(),
                extra: serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("I like Coffee, in the MORNING!");
        assert_eq!(tokens, vec!["like", "coffee", "the", "morning"]);
    }

    #[test]
    fn test_tokenize_strips_punctuation_inside_words() {
        assert_eq!(tokenize("don't e-mail"), vec!["dont", "email"]);
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        // Two-letter terms such as "ai" and "ml" are not indexed.
        assert!(tokenize("ai ml go is").is_empty());
        assert_eq!(tokenize("ai rust"), vec!["rust"]);
    }

    #[test]
    fn test_tokenize_counts_chars_not_bytes() {
        assert_eq!(tokenize("été ça"), vec!["été"]);
    }

    #[test]
    fn test_search_exact_and_partial() {
        let index = KeywordIndex::build(&[
            record("a", "I like coffee in the morning", "preference"),
            record("b", "Morning standup at nine", "calendar"),
        ]);

        let hits = index.search("coffee morning", 10, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].match_kind, MatchKind::Exact);
        assert!((hits[0].overlap_score - 1.0).abs() < f32::EPSILON);
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[1].match_kind, MatchKind::Partial);
        assert!((hits[1].overlap_score - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_search_ties_follow_insertion_order() {
        let index = KeywordIndex::build(&[
            record("first", "rust compiler", "general"),
            record("second", "rust borrow", "general"),
            record("third", "rust traits", "general"),
        ]);
        let ids: Vec<String> = index.search("rust", 10, None).into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_search_limit_and_type_filter() {
        let index = KeywordIndex::build(&[
            record("a", "coffee beans", "shopping"),
            record("b", "coffee with anna", "calendar"),
            record("c", "coffee grinder", "shopping"),
        ]);
        let hits = index.search("coffee", 1, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let shopping: Vec<String> = index
            .search("coffee", 10, Some("shopping"))
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(shopping, vec!["a", "c"]);
    }

    #[test]
    fn test_search_duplicate_query_tokens_counted_once() {
        let index = KeywordIndex::build(&[record("a", "coffee", "general")]);
        let hits = index.search("coffee coffee", 10, None);
        assert_eq!(hits[0].matches, 1);
        assert_eq!(hits[0].match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_search_no_tokens_returns_empty() {
        let index = KeywordIndex::build(&[record("a", "coffee", "general")]);
        assert!(index.search("a an to", 10, None).is_empty());
        assert!(index.search("coffee", 0, None).is_empty());
        assert!(KeywordIndex::new().search("coffee", 10, None).is_empty());
    }

    #[test]
    fn test_remove_excises_only_that_id() {
        let mut index = KeywordIndex::build(&[
            record("a", "rust programming", "general"),
            record("b", "python programming", "general"),
        ]);
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(!index.contains("a"));
        assert_eq!(index.len(), 1);

        assert!(index.search("rust", 10, None).is_empty());
        let hits = index.search("programming", 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        // "rust" had no other postings and is gone entirely.
        assert_eq!(index.token_count(), 2);
    }

    #[test]
    fn test_hits_contain_a_query_token() {
        let records = vec![
            record("a", "The quick brown fox", "general"),
            record("b", "Lazy dogs sleep all day", "general"),
            record("c", "Foxes and dogs", "general"),
        ];
        let index = KeywordIndex::build(&records);
        let query = "brown dogs";
        let query_tokens = tokenize(query);
        for hit in index.search(query, 10, None) {
            let content = &records.iter().find(|r| r.id == hit.id).unwrap().content;
            let content_tokens = tokenize(content);
            assert!(query_tokens.iter().any(|q| content_tokens.contains(q)));
        }
    }
}
