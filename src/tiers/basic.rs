//! Basic tier
//!
//! Keyword-only backend: scores each record by the fraction of query tokens
//! present in its content. No embeddings, no network, no persistence.

use super::{MemoryTierAdapter, Tier, TierError, TierHealth};
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Keyword-matching tier
#[derive(Default)]
pub struct BasicTier {
    records: RwLock<HashMap<String, MemoryRecord>>,
}

impl BasicTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for BasicTier {
    fn tier(&self) -> Tier {
        Tier::Basic
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        self.records
            .write()
            .insert(record.id.0.clone(), record.clone());
        Ok(record.id.clone())
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        let query_tokens = tokenize(&query.text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let records = self.records.read();

        let mut results: Vec<MemoryResult> = records
            .values()
            .filter(|r| r.tenant_id == query.tenant_id)
            .filter(|r| match (&query.agent_id, &r.agent_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|r| query.type_filter.map_or(true, |t| r.memory_type == t))
            .filter(|r| !r.is_expired(now))
            .filter_map(|r| {
                let content_tokens = tokenize(&r.content);
                let overlap = query_tokens.intersection(&content_tokens).count();
                let score = overlap as f32 / query_tokens.len() as f32;
                if score > 0.0 && score >= query.threshold {
                    Some(MemoryResult {
                        record: r.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                .then_with(|| a.record.id.0.cmp(&b.record.id.0))
        });
        results.truncate(query.limit);

        Ok(results)
    }

    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        let now = Utc::now();
        let records = self.records.read();

        let mut recent: Vec<MemoryRecord> = records
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| agent_id.map_or(true, |a| r.agent_id.as_deref() == Some(a)))
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect();

        recent.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        recent.truncate(limit);

        Ok(recent)
    }

    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        Ok(self.records.write().remove(&id.0))
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        let now = Utc::now();
        let mut records = self.records.write();
        for id in ids {
            if let Some(record) = records.get_mut(&id.0) {
                record.record_access(now);
            }
        }
        Ok(())
    }

    async fn health(&self) -> TierHealth {
        TierHealth {
            tier: Tier::Basic,
            healthy: true,
            message: None,
            record_count: self.records.read().len() as u64,
        }
    }

    async fn housekeeping(&self) -> Result<(), TierError> {
        let now = Utc::now();
        self.records.write().retain(|_, r| !r.is_expired(now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_scoring() {
        let tier = BasicTier::new();
        let record = MemoryRecord::new("User prefers dark mode", "t1");
        tier.remember(&record).await.unwrap();

        // All query tokens present: full score
        let query = MemoryQuery::new("dark mode", "t1").with_threshold(0.5);
        let results = tier.recall(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);

        // Half the tokens present
        let query = MemoryQuery::new("dark chocolate", "t1").with_threshold(0.4);
        let results = tier.recall(&query).await.unwrap();
        assert_eq!(results[0].score, 0.5);
    }

    #[tokio::test]
    async fn test_no_overlap_no_results() {
        let tier = BasicTier::new();
        tier.remember(&MemoryRecord::new("User prefers dark mode", "t1"))
            .await
            .unwrap();

        let query = MemoryQuery::new("quarterly revenue", "t1").with_threshold(0.0);
        assert!(tier.recall(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_type_filter() {
        let tier = BasicTier::new();
        tier.remember(&MemoryRecord::new("User prefers dark mode", "t1"))
            .await
            .unwrap();

        let query = MemoryQuery::new("dark mode", "t1")
            .with_type(crate::types::MemoryType::Task)
            .with_threshold(0.0);
        assert!(tier.recall(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_order() {
        let tier = BasicTier::new();
        let mut first = MemoryRecord::new("older", "t1");
        first.created_at = Utc::now() - chrono::Duration::seconds(60);
        tier.remember(&first).await.unwrap();
        tier.remember(&MemoryRecord::new("newer", "t1")).await.unwrap();

        let recent = tier.recent("t1", None, 10).await.unwrap();
        assert_eq!(recent[0].content, "newer");
        assert_eq!(recent[1].content, "older");
    }
}
