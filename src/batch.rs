//! Batch operations
//!
//! Fan-out helpers over the engine: items are partitioned by tenant,
//! each partition runs with bounded concurrency, and per-item failures
//! never abort the batch. Results come back in the caller's order.

use crate::engine::MemoryEngine;
use crate::error::EngineError;
use crate::types::{MemoryId, MemoryQuery, MemoryResult, RememberOptions};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::debug;

/// One item in a batched remember call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRememberItem {
    pub content: String,
    pub tenant_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub options: Option<RememberOptions>,
}

impl BatchRememberItem {
    pub fn new(content: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tenant_id: tenant_id.into(),
            agent_id: None,
            options: None,
        }
    }
}

/// Group indexed items into per-tenant buckets, tenants in first-seen order
fn partition_by_tenant<T>(
    items: Vec<T>,
    tenant_of: impl Fn(&T) -> &str,
) -> Vec<(String, Vec<(usize, T)>)> {
    let mut partitions: Vec<(String, Vec<(usize, T)>)> = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let tenant = tenant_of(&item);
        match partitions.iter_mut().find(|(t, _)| t == tenant) {
            Some((_, bucket)) => bucket.push((idx, item)),
            None => partitions.push((tenant.to_string(), vec![(idx, item)])),
        }
    }
    partitions
}

impl MemoryEngine {
    /// Store many memories. Each item succeeds or fails on its own; the
    /// returned vector matches the input order.
    pub async fn remember_batch(
        &self,
        items: Vec<BatchRememberItem>,
    ) -> Vec<Result<MemoryId, EngineError>> {
        let width = self.batch_size();
        let total = items.len();
        let mut outcomes: Vec<(usize, Result<MemoryId, EngineError>)> = Vec::with_capacity(total);

        for (tenant, bucket) in partition_by_tenant(items, |i| &i.tenant_id) {
            debug!(tenant = %tenant, count = bucket.len(), "Running remember batch partition");
            let partition: Vec<(usize, Result<MemoryId, EngineError>)> = stream::iter(bucket)
                .map(|(idx, item)| async move {
                    let result = self
                        .remember(
                            &item.content,
                            &item.tenant_id,
                            item.agent_id.as_deref(),
                            item.options,
                        )
                        .await;
                    (idx, result)
                })
                .buffered(width)
                .collect()
                .await;
            outcomes.extend(partition);
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, result)| result).collect()
    }

    /// Run many recall queries. Each query succeeds or fails on its own;
    /// the returned vector matches the input order.
    pub async fn recall_batch(
        &self,
        queries: Vec<MemoryQuery>,
    ) -> Vec<Result<Vec<MemoryResult>, EngineError>> {
        let width = self.batch_size();
        let total = queries.len();
        let mut outcomes: Vec<(usize, Result<Vec<MemoryResult>, EngineError>)> =
            Vec::with_capacity(total);

        for (tenant, bucket) in partition_by_tenant(queries, |q| &q.tenant_id) {
            debug!(tenant = %tenant, count = bucket.len(), "Running recall batch partition");
            let partition: Vec<(usize, Result<Vec<MemoryResult>, EngineError>)> =
                stream::iter(bucket)
                    .map(|(idx, query)| async move { (idx, self.recall(query).await) })
                    .buffered(width)
                    .collect()
                    .await;
            outcomes.extend(partition);
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::tiers::{Tier, TierEnvironment};

    async fn mock_engine() -> MemoryEngine {
        let config = EngineConfig {
            preferred_tier: Some(Tier::Mock),
            auto_detect: false,
            ..Default::default()
        };
        let engine = MemoryEngine::with_environment(config, TierEnvironment::default()).unwrap();
        engine.initialize().await.unwrap();
        engine
    }

    #[test]
    fn test_partition_keeps_first_seen_tenant_order() {
        let items = vec![
            BatchRememberItem::new("a", "t2"),
            BatchRememberItem::new("b", "t1"),
            BatchRememberItem::new("c", "t2"),
        ];
        let partitions = partition_by_tenant(items, |i| &i.tenant_id);

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].0, "t2");
        assert_eq!(partitions[0].1.len(), 2);
        assert_eq!(partitions[1].0, "t1");
        // Original indices survive partitioning
        assert_eq!(partitions[0].1[1].0, 2);
    }

    #[tokio::test]
    async fn test_remember_batch_preserves_order_across_tenants() {
        let engine = mock_engine().await;
        let items = vec![
            BatchRememberItem::new("first for t1", "t1"),
            BatchRememberItem::new("first for t2", "t2"),
            BatchRememberItem::new("second for t1", "t1"),
        ];

        let results = engine.remember_batch(items).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));

        // Each tenant only sees its own records
        let t1 = engine
            .get_context(crate::types::ContextRequest::new("t1"))
            .await
            .unwrap();
        assert_eq!(t1.memories.len(), 2);
    }

    #[tokio::test]
    async fn test_remember_batch_isolates_failures() {
        let engine = mock_engine().await;
        let items = vec![
            BatchRememberItem::new("valid content", "t1"),
            BatchRememberItem::new("   ", "t1"),
            BatchRememberItem::new("also valid", "t1"),
        ];

        let results = engine.remember_batch(items).await;
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().code(), "INVALID_CONTENT");
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_recall_batch_matches_input_order() {
        let engine = mock_engine().await;
        engine
            .remember("User prefers dark mode", "t1", None, None)
            .await
            .unwrap();
        engine
            .remember("Deploy runs on Fridays", "t2", None, None)
            .await
            .unwrap();

        let queries = vec![
            MemoryQuery::new("dark mode", "t1"),
            MemoryQuery::new("", "t1"),
            MemoryQuery::new("deploy runs", "t2"),
        ];

        let results = engine.recall_batch(queries).await;
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert_eq!(results[1].as_ref().unwrap_err().code(), "INVALID_QUERY");
        assert_eq!(results[2].as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = mock_engine().await;
        assert!(engine.remember_batch(Vec::new()).await.is_empty());
        assert!(engine.recall_batch(Vec::new()).await.is_empty());
    }
}
