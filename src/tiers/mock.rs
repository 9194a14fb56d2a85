//! Mock tier
//!
//! Zero-prerequisite in-memory stub: substring matching with fixed scores.
//! Terminates every fallback chain, so it must never fail.

use super::{MemoryTierAdapter, Tier, TierError, TierHealth};
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use chrono::Utc;
use parking_lot::RwLock;

/// Score for an exact substring match
const SUBSTRING_MATCH_SCORE: f32 = 0.9;

/// Score when only individual tokens match
const TOKEN_MATCH_SCORE: f32 = 0.5;

/// In-memory stub tier
#[derive(Default)]
pub struct MockTier {
    records: RwLock<Vec<MemoryRecord>>,
}

impl MockTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for MockTier {
    fn tier(&self) -> Tier {
        Tier::Mock
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        let mut records = self.records.write();
        records.retain(|r| r.id != record.id);
        records.push(record.clone());
        Ok(record.id.clone())
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        let needle = query.text.to_lowercase();
        let tokens: Vec<&str> = needle.split_whitespace().collect();
        let records = self.records.read();

        let mut results: Vec<MemoryResult> = records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == query.tenant_id)
            .filter(|r| match (&query.agent_id, &r.agent_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|r| query.type_filter.map_or(true, |t| r.memory_type == t))
            .filter_map(|r| {
                let haystack = r.content.to_lowercase();
                let score = if haystack.contains(&needle) {
                    SUBSTRING_MATCH_SCORE
                } else if tokens.iter().any(|t| haystack.contains(t)) {
                    TOKEN_MATCH_SCORE
                } else {
                    return None;
                };
                (score >= query.threshold).then(|| MemoryResult {
                    record: r.clone(),
                    score,
                })
            })
            .collect();

        results.truncate(query.limit);
        Ok(results)
    }

    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| agent_id.map_or(true, |a| r.agent_id.as_deref() == Some(a)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        let mut records = self.records.write();
        match records.iter().position(|r| r.id == *id) {
            Some(idx) => Ok(Some(records.remove(idx))),
            None => Ok(None),
        }
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        let now = Utc::now();
        let mut records = self.records.write();
        for record in records.iter_mut() {
            if ids.contains(&record.id) {
                record.record_access(now);
            }
        }
        Ok(())
    }

    async fn health(&self) -> TierHealth {
        TierHealth {
            tier: Tier::Mock,
            healthy: true,
            message: None,
            record_count: self.records.read().len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_substring_match_scores_high() {
        let tier = MockTier::new();
        tier.remember(&MemoryRecord::new("User prefers dark mode", "t1"))
            .await
            .unwrap();

        let results = tier
            .recall(&MemoryQuery::new("dark mode", "t1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, SUBSTRING_MATCH_SCORE);
    }

    #[tokio::test]
    async fn test_token_match_scores_low() {
        let tier = MockTier::new();
        tier.remember(&MemoryRecord::new("User prefers dark mode", "t1"))
            .await
            .unwrap();

        // "mode switch" is not a substring but "mode" is a token
        let query = MemoryQuery::new("mode switch", "t1").with_threshold(0.3);
        let results = tier.recall(&query).await.unwrap();
        assert_eq!(results[0].score, TOKEN_MATCH_SCORE);
    }

    #[tokio::test]
    async fn test_remember_is_idempotent_per_id() {
        let tier = MockTier::new();
        let record = MemoryRecord::new("same record", "t1");
        tier.remember(&record).await.unwrap();
        tier.remember(&record).await.unwrap();

        assert_eq!(tier.health().await.record_count, 1);
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let tier = MockTier::new();
        tier.remember(&MemoryRecord::new("first", "t1")).await.unwrap();
        tier.remember(&MemoryRecord::new("second", "t1")).await.unwrap();

        let recent = tier.recent("t1", None, 10).await.unwrap();
        assert_eq!(recent[0].content, "second");
    }
}
