//! Advanced tier
//!
//! Full-featured backend: a hosted embedding provider plus a vector store.
//! Both collaborators are injected behind their traits, so the same adapter
//! serves tests (hash embeddings, in-memory store) and production (OpenAI,
//! persistent index).

use super::{MemoryTierAdapter, Tier, TierError, TierHealth};
use crate::embedding::EmbeddingProvider;
use crate::store::VectorStore;
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Embedding-backed vector-search tier
pub struct AdvancedTier {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl AdvancedTier {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for AdvancedTier {
    fn tier(&self) -> Tier {
        Tier::Advanced
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        let vector = match &record.embedding {
            Some(v) => v.clone(),
            None => self.embedder.embed(&record.content).await?,
        };

        self.store.store_memory(record, &vector).await?;
        info!(id = %record.id, tenant = %record.tenant_id, "Memory stored");
        Ok(record.id.clone())
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        let vector = self.embedder.embed(&query.text).await?;
        let results = self.store.search_memories(&vector, query).await?;
        debug!(
            tenant = %query.tenant_id,
            count = results.len(),
            "Vector search completed"
        );
        Ok(results)
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
        match self.store.count().await {
            Ok(record_count) => TierHealth {
                tier: Tier::Advanced,
                healthy: true,
                message: None,
                record_count,
            },
            Err(e) => TierHealth {
                tier: Tier::Advanced,
                healthy: false,
                message: Some(e.to_string()),
                record_count: 0,
            },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::store::InMemoryVectorStore;

    fn tier() -> AdvancedTier {
        AdvancedTier::new(
            Arc::new(HashEmbeddingProvider::default()),
            Arc::new(InMemoryVectorStore::new()),
        )
    }

    #[tokio::test]
    async fn test_remember_then_recall() {
        let tier = tier();
        let record = MemoryRecord::new("User prefers dark mode", "t1");
        let id = tier.remember(&record).await.unwrap();

        let query = MemoryQuery::new("dark mode", "t1").with_threshold(0.1);
        let results = tier.recall(&query).await.unwrap();
        assert_eq!(results[0].record.id, id);
    }

    #[tokio::test]
    async fn test_forget() {
        let tier = tier();
        let record = MemoryRecord::new("temporary note", "t1");
        let id = tier.remember(&record).await.unwrap();

        assert!(tier.forget(&id).await.unwrap().is_some());
        assert!(tier.forget(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_health_reports_count() {
        let tier = tier();
        tier.remember(&MemoryRecord::new("one", "t1")).await.unwrap();

        let health = tier.health().await;
        assert!(health.healthy);
        assert_eq!(health.record_count, 1);
    }

    #[tokio::test]
    async fn test_precomputed_embedding_is_reused() {
        let tier = tier();
        let mut record = MemoryRecord::new("preembedded", "t1");
        record.embedding = Some(vec![0.0; 384]);

        // Zero vector stores fine but never matches anything
        tier.remember(&record).await.unwrap();
        let query = MemoryQuery::new("preembedded", "t1").with_threshold(0.1);
        assert!(tier.recall(&query).await.unwrap().is_empty());
    }
}
