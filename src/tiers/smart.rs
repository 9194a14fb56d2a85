//! Smart tier
//!
//! Local-model backend: deterministic local embeddings over an in-memory
//! vector store. No network access, so it survives credential loss and
//! offline operation at the cost of embedding quality.

use super::{MemoryTierAdapter, Tier, TierError, TierHealth};
use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use crate::store::{InMemoryVectorStore, VectorStore};
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use std::sync::Arc;
use tracing::debug;

/// Local embedding tier
pub struct SmartTier {
    embedder: Arc<dyn EmbeddingProvider>,
    store: InMemoryVectorStore,
}

impl SmartTier {
    pub fn new() -> Self {
        Self {
            embedder: Arc::new(HashEmbeddingProvider::default()),
            store: InMemoryVectorStore::new(),
        }
    }

    /// Use a caller-supplied local embedder (e.g. a cached wrapper)
    pub fn with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: InMemoryVectorStore::new(),
        }
    }
}

impl Default for SmartTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for SmartTier {
    fn tier(&self) -> Tier {
        Tier::Smart
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        let vector = self.embedder.embed(&record.content).await?;
        self.store.store_memory(record, &vector).await?;
        debug!(id = %record.id, tenant = %record.tenant_id, "Memory stored locally");
        Ok(record.id.clone())
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        let vector = self.embedder.embed(&query.text).await?;
        self.store.search_memories(&vector, query).await
    }

    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        self.store.fetch_recent(tenant_id, agent_id, limit).await
    }

    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        self.store.delete(id).await
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        self.store.touch(ids).await
    }

    async fn health(&self) -> TierHealth {
        let record_count = self.store.count().await.unwrap_or(0);
        TierHealth {
            tier: Tier::Smart,
            healthy: true,
            message: None,
            record_count,
        }
    }

    async fn housekeeping(&self) -> Result<(), TierError> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            debug!(purged, "Purged expired records");
        }
        Ok(())
    }
}
