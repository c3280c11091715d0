//! Administrative operations: statistics, index rebuild, embedding
//! reconfiguration, export/import and clear.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use recall_core::RecallResult;
use serde::Serialize;
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::engine::MemoryEngine;
use crate::keyword::KeywordIndex;
use crate::record::MemoryRecord;

/// Summary of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Number of stored records.
    pub total: usize,
    /// Record count per `metadata.type`.
    pub by_type: BTreeMap<String, usize>,
    /// Earliest creation instant.
    pub oldest_ts: Option<DateTime<Utc>>,
    /// Latest creation instant.
    pub newest_ts: Option<DateTime<Utc>>,
}

/// Outcome of [`MemoryEngine::rebuild_keyword_index_from_disk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Whether the live index was replaced.
    pub rebuilt: bool,
    /// Number of records fed into the new index.
    pub indexed_count: usize,
}

/// How [`MemoryEngine::import_with`] treats records whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Append every record, duplicates included. Re-importing an export
    /// doubles the store.
    #[default]
    Append,
    /// Skip records whose id is already stored or appears earlier in the
    /// same batch.
    SkipExistingIds,
}

impl MemoryEngine {
    /// Count records, per type, and the creation time range in one pass.
    pub async fn get_stats(&self) -> RecallResult<MemoryStats> {
        let mut stats = MemoryStats::default();
        let mut scan = self.store.scan(None).await?;
        while let Some(record) = scan.next_record().await? {
            stats.total += 1;
            *stats.by_type.entry(record.metadata.kind).or_insert(0) += 1;
            let ts = record.metadata.timestamp;
            stats.oldest_ts = Some(stats.oldest_ts.map_or(ts, |o| o.min(ts)));
            stats.newest_ts = Some(stats.newest_ts.map_or(ts, |n| n.max(ts)));
        }
        Ok(stats)
    }

    /// Number of stored records.
    pub async fn count(&self) -> RecallResult<usize> {
        Ok(self.get_stats().await?.total)
    }

    /// Re-derive the live keyword index from the log, e.g. after another
    /// process modified the file.
    pub async fn rebuild_keyword_index_from_disk(&self) -> RecallResult<RebuildReport> {
        let records = self.store.load(None).await?;
        let index = KeywordIndex::build(&records);
        *self.index.write().await = index;
        info!(indexed_count = records.len(), "keyword index rebuilt from disk");
        Ok(RebuildReport {
            rebuilt: true,
            indexed_count: records.len(),
        })
    }

    /// Reconfigure the embedding client (endpoint, model, key, timeout).
    ///
    /// Validated for shape only; connectivity is not checked.
    pub fn configure_embeddings(&self, config: &EmbeddingConfig) -> RecallResult<()> {
        config.validate()?;
        self.embedder.configure(config)?;
        *self.embed_timeout.write() = config.timeout();
        info!(
            model = %config.model,
            timeout_ms = config.timeout_ms,
            "embedding configuration updated"
        );
        Ok(())
    }

    /// Whether the embedding provider answers its liveness probe within the
    /// configured timeout.
    pub async fn is_embedding_available(&self) -> bool {
        let timeout = *self.embed_timeout.read();
        tokio::time::timeout(timeout, self.embedder.probe())
            .await
            .unwrap_or(false)
    }

    /// Every stored record, embeddings included, in log order.
    pub async fn export(&self) -> RecallResult<Vec<MemoryRecord>> {
        self.store.export().await
    }

    /// Append already-embedded records without deduplication.
    pub async fn import(&self, records: Vec<MemoryRecord>) -> RecallResult<usize> {
        self.import_with(records, ImportMode::Append).await
    }

    /// Append already-embedded records, returning how many were written.
    pub async fn import_with(
        &self,
        records: Vec<MemoryRecord>,
        mode: ImportMode,
    ) -> RecallResult<usize> {
        let records = match mode {
            ImportMode::Append => records,
            ImportMode::SkipExistingIds => {
                let mut seen: HashSet<String> = self
                    .store
                    .load(None)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .collect();
                records
                    .into_iter()
                    .filter(|r| seen.insert(r.id.clone()))
                    .collect()
            }
        };

        let imported = self.store.import(&records).await?;
        let mut index = self.index.write().await;
        for record in &records {
            index.add(record);
            self.cache.insert(&record.id, record.embedding.clone());
        }
        info!(imported, ?mode, "memories imported");
        Ok(imported)
    }

    /// Delete every record.
    pub async fn clear(&self) -> RecallResult<()> {
        self.store.clear().await?;
        *self.index.write().await = KeywordIndex::new();
        self.cache.clear();
        Ok(())
    }
}
