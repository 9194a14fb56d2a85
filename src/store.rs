//! Vector store
//!
//! Storage contract consumed by the embedding-backed tiers, plus an
//! in-memory cosine-similarity implementation. Persistence engines
//! (sqlite-vec, remote indexes) plug in behind the same trait.

use crate::tiers::TierError;
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Cosine similarity of two vectors; 0.0 when either norm is zero or the
/// dimensions disagree
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Half-life in days for the optional time-decay weighting
const TIME_DECAY_HALF_LIFE_DAYS: f32 = 30.0;

/// Vector storage contract
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a record together with its embedding
    async fn store_memory(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), TierError>;

    /// Ranked similarity search honoring the query's filters and threshold
    async fn search_memories(
        &self,
        vector: &[f32],
        query: &MemoryQuery,
    ) -> Result<Vec<MemoryResult>, TierError>;

    /// Most recent records for a tenant/agent, newest first
    async fn fetch_recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError>;

    /// Refresh last-accessed timestamps and bump access counters
    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError>;

    /// Delete a record, returning it when it existed
    async fn delete(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError>;

    /// Remove records whose own TTL elapsed, returning how many were dropped
    async fn purge_expired(&self) -> Result<u64, TierError>;

    /// Number of stored records
    async fn count(&self) -> Result<u64, TierError>;
}

/// In-memory vector store with brute-force cosine search
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, (MemoryRecord, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store_memory(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), TierError> {
        let mut records = self.records.write();
        records.insert(record.id.0.clone(), (record.clone(), vector.to_vec()));
        Ok(())
    }

    async fn search_memories(
        &self,
        vector: &[f32],
        query: &MemoryQuery,
    ) -> Result<Vec<MemoryResult>, TierError> {
        let now = Utc::now();
        let records = self.records.read();

        let mut results: Vec<MemoryResult> = records
            .values()
            .filter(|(r, _)| r.tenant_id == query.tenant_id)
            .filter(|(r, _)| match (&query.agent_id, &r.agent_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|(r, _)| query.type_filter.map_or(true, |t| r.memory_type == t))
            .filter(|(r, _)| !r.is_expired(now))
            .filter_map(|(r, v)| {
                let mut score = cosine_similarity(vector, v);
                if query.time_decay {
                    let age_days =
                        (now - r.created_at).num_seconds().max(0) as f32 / 86_400.0;
                    score *= 0.5f32.powf(age_days / TIME_DECAY_HALF_LIFE_DAYS);
                }
                if score >= query.threshold {
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

    async fn fetch_recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        let now = Utc::now();
        let records = self.records.read();

        let mut recent: Vec<MemoryRecord> = records
            .values()
            .filter(|(r, _)| r.tenant_id == tenant_id)
            .filter(|(r, _)| agent_id.map_or(true, |a| r.agent_id.as_deref() == Some(a)))
            .filter(|(r, _)| !r.is_expired(now))
            .map(|(r, _)| r.clone())
            .collect();

        recent.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        recent.truncate(limit);

        Ok(recent)
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        let now = Utc::now();
        let mut records = self.records.write();
        for id in ids {
            if let Some((record, _)) = records.get_mut(&id.0) {
                record.record_access(now);
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        Ok(self.records.write().remove(&id.0).map(|(record, _)| record))
    }

    async fn purge_expired(&self) -> Result<u64, TierError> {
        let now = Utc::now();
        let mut records = self.records.write();
        let expired: Vec<String> = records
            .iter()
            .filter(|(_, (r, _))| r.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            records.remove(key);
        }
        Ok(expired.len() as u64)
    }

    async fn count(&self) -> Result<u64, TierError> {
        Ok(self.records.read().len() as u64)
    }
}
