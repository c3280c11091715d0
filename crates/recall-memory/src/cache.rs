use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Vec<f32>>,
    /// Insertion order, oldest first. May hold ids already removed from
    /// `entries`; those are skipped on eviction.
    order: VecDeque<String>,
}

/// Bounded in-memory map from record id to embedding.
///
/// Purely an optimization: a miss says nothing about whether the record
/// exists. When full, the oldest insertion is evicted.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings. A capacity of
    /// zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Cached embedding for `id`, if any.
    pub fn get(&self, id: &str) -> Option<Vec<f32>> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// Cache an embedding, evicting the oldest entries when over capacity.
    pub fn insert(&self, id: &str, embedding: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.entries.insert(id.to_string(), embedding).is_none() {
            inner.order.push_back(id.to_string());
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    /// Drop the entry for `id`.
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock();
        if inner.entries.remove(id).is_some() {
            inner.order.retain(|k| k != id);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of cached embeddings.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached embeddings.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
