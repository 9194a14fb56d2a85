//! Performance layer
//!
//! Wraps a tier adapter with an embedding cache, a query-result cache,
//! deterministic cache-key derivation, write invalidation, and per-call
//! metric recording. The engine wraps every adapter it constructs, so all
//! tiers inherit the same caching and telemetry behavior.

use crate::cache::{CacheConfig, CacheStats, TtlCache};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::tiers::{MemoryTierAdapter, Tier, TierError, TierHealth};
use crate::types::{
    MemoryId, MemoryQuery, MemoryRecord, MemoryResult, Operation, PerformanceMetric,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// TTL for cached embeddings (1 hour)
pub const EMBEDDING_CACHE_TTL_SECS: u64 = 3600;

/// Result-cache TTL for empty result sets
const RESULT_TTL_EMPTY_SECS: u64 = 60;

/// Result-cache TTL for large result sets
const RESULT_TTL_LARGE_SECS: u64 = 120;

/// Result count above which the large-set TTL applies
const LARGE_RESULT_COUNT: usize = 50;

/// Default base TTL for cached results
pub const RESULT_TTL_DEFAULT_SECS: u64 = 300;

/// Retained metric count; oldest entries are silently dropped
pub const METRICS_CAPACITY: usize = 1000;

/// Default latency above which an operation is flagged as slow
pub const SLOW_OP_THRESHOLD_MS: u64 = 100;

/// Collapse whitespace and case so equivalent content shares a cache key
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic hex fingerprint over ordered parts
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Cache key for a recall query; every distinguishing field participates
pub fn query_fingerprint(query: &MemoryQuery) -> String {
    let limit = query.limit.to_string();
    let threshold = format!("{:.4}", query.threshold);
    fingerprint(&[
        "recall",
        &normalize_text(&query.text),
        &query.tenant_id,
        query.agent_id.as_deref().unwrap_or("-"),
        query.type_filter.map(|t| t.as_str()).unwrap_or("-"),
        &limit,
        &threshold,
        if query.include_context { "1" } else { "0" },
        if query.time_decay { "1" } else { "0" },
    ])
}

/// Aggregated view over the retained metrics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_operations: usize,
    pub cache_hits: usize,
    pub cache_hit_rate: f64,
    pub avg_duration_ms: f64,
    pub slow_operations: usize,
}

/// Capped ring buffer of per-operation telemetry
pub struct MetricsRecorder {
    metrics: Mutex<VecDeque<PerformanceMetric>>,
    capacity: usize,
    slow_threshold_ms: u64,
}

impl MetricsRecorder {
    pub fn new(slow_threshold_ms: u64) -> Self {
        Self {
            metrics: Mutex::new(VecDeque::with_capacity(METRICS_CAPACITY)),
            capacity: METRICS_CAPACITY,
            slow_threshold_ms,
        }
    }

    /// Append a metric, dropping the oldest once at capacity
    pub fn record(&self, metric: PerformanceMetric) {
        if metric.duration_ms >= self.slow_threshold_ms {
            warn!(
                operation = %metric.operation,
                duration_ms = metric.duration_ms,
                tenant = %metric.tenant_id,
                "Slow memory operation"
            );
        }

        let mut metrics = self.metrics.lock();
        if metrics.len() == self.capacity {
            metrics.pop_front();
        }
        metrics.push_back(metric);
    }

    /// Copy of all retained metrics, oldest first
    pub fn snapshot(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().iter().cloned().collect()
    }

    /// Retained metrics that exceeded the slow threshold
    pub fn slow_operations(&self) -> Vec<PerformanceMetric> {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.duration_ms >= self.slow_threshold_ms)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let metrics = self.metrics.lock();
        let total = metrics.len();
        let hits = metrics.iter().filter(|m| m.cache_hit).count();
        let slow = metrics
            .iter()
            .filter(|m| m.duration_ms >= self.slow_threshold_ms)
            .count();
        let total_ms: u64 = metrics.iter().map(|m| m.duration_ms).sum();

        MetricsSummary {
            total_operations: total,
            cache_hits: hits,
            cache_hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                total_ms as f64 / total as f64
            },
            slow_operations: slow,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(SLOW_OP_THRESHOLD_MS)
    }
}

/// Embedding provider wrapper that reuses embeddings for identical content
/// within the TTL window
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: TtlCache<Vec<f32>>,
    ttl: Duration,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: TtlCache::new(capacity),
            ttl: Duration::from_secs(EMBEDDING_CACHE_TTL_SECS),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = fingerprint(&["embed", &normalize_text(text)]);
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        self.cache.set(key, vector.clone(), self.ttl);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Performance-layer knobs
#[derive(Debug, Clone)]
pub struct PerfConfig {
    pub result_cache: CacheConfig,
    /// Base TTL for cached results; the empty/large heuristics still apply
    pub result_ttl_secs: u64,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            result_cache: CacheConfig {
                capacity: 512,
                compression_threshold_bytes: Some(4096),
            },
            result_ttl_secs: RESULT_TTL_DEFAULT_SECS,
        }
    }
}

/// Adapter decorator adding result caching, invalidation, and metrics
pub struct PerformanceDecorator {
    inner: Arc<dyn MemoryTierAdapter>,
    result_cache: TtlCache<Vec<MemoryResult>>,
    embedding_cache: Option<Arc<CachedEmbeddingProvider>>,
    recorder: Arc<MetricsRecorder>,
    base_ttl_secs: u64,
}

impl PerformanceDecorator {
    pub fn new(
        inner: Arc<dyn MemoryTierAdapter>,
        recorder: Arc<MetricsRecorder>,
        config: PerfConfig,
    ) -> Self {
        Self {
            inner,
            result_cache: TtlCache::with_config(config.result_cache),
            embedding_cache: None,
            recorder,
            base_ttl_secs: config.result_ttl_secs,
        }
    }

    /// Attach the embedding cache the wrapped adapter was constructed with,
    /// so its statistics surface through the decorator
    pub fn with_embedding_cache(mut self, cache: Arc<CachedEmbeddingProvider>) -> Self {
        self.embedding_cache = Some(cache);
        self
    }

    pub fn result_cache_stats(&self) -> CacheStats {
        self.result_cache.stats()
    }

    pub fn embedding_cache_stats(&self) -> Option<CacheStats> {
        self.embedding_cache.as_ref().map(|c| c.stats())
    }

    fn result_ttl(&self, result_count: usize) -> Duration {
        let secs = if result_count == 0 {
            RESULT_TTL_EMPTY_SECS
        } else if result_count > LARGE_RESULT_COUNT {
            RESULT_TTL_LARGE_SECS
        } else {
            self.base_ttl_secs
        };
        Duration::from_secs(secs)
    }

    fn emit(
        &self,
        operation: Operation,
        started: Instant,
        cache_hit: bool,
        result_count: Option<usize>,
        tenant_id: &str,
    ) {
        self.recorder.record(PerformanceMetric {
            operation,
            duration_ms: started.elapsed().as_millis() as u64,
            cache_hit,
            result_count,
            tenant_id: tenant_id.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for PerformanceDecorator {
    fn tier(&self) -> Tier {
        self.inner.tier()
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        let started = Instant::now();
        let id = self.inner.remember(record).await?;

        // Coarse invalidation: any write may make any cached result stale
        self.result_cache.clear();

        self.emit(Operation::Remember, started, false, None, &record.tenant_id);
        Ok(id)
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        let started = Instant::now();
        let key = query_fingerprint(query);

        if let Some(results) = self.result_cache.get(&key) {
            let ids: Vec<MemoryId> = results.iter().map(|r| r.record.id.clone()).collect();
            self.inner.touch(&ids).await?;
            self.emit(
                Operation::Recall,
                started,
                true,
                Some(results.len()),
                &query.tenant_id,
            );
            return Ok(results);
        }

        let results = self.inner.recall(query).await?;
        let ids: Vec<MemoryId> = results.iter().map(|r| r.record.id.clone()).collect();
        self.inner.touch(&ids).await?;

        self.result_cache
            .set(key, results.clone(), self.result_ttl(results.len()));
        self.emit(
            Operation::Recall,
            started,
            false,
            Some(results.len()),
            &query.tenant_id,
        );
        Ok(results)
    }

    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        let started = Instant::now();
        let records = self.inner.recent(tenant_id, agent_id, limit).await?;
        self.emit(
            Operation::Context,
            started,
            false,
            Some(records.len()),
            tenant_id,
        );
        Ok(records)
    }

    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        let started = Instant::now();
        let removed = self.inner.forget(id).await?;
        self.result_cache.clear();
        let tenant = removed
            .as_ref()
            .map(|r| r.tenant_id.as_str())
            .unwrap_or("-");
        self.emit(Operation::Forget, started, false, None, tenant);
        Ok(removed)
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        self.inner.touch(ids).await
    }

    async fn health(&self) -> TierHealth {
        self.inner.health().await
    }

    async fn housekeeping(&self) -> Result<(), TierError> {
        self.result_cache.purge_expired();
        if let Some(cache) = &self.embedding_cache {
            cache.cache.purge_expired();
        }
        self.inner.housekeeping().await
    }
}
