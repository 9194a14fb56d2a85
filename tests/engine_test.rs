//! End-to-end engine tests
//!
//! Exercises the public API: initialization and tier detection, the
//! remember/recall/context/forget cycle, result caching, fallback on tier
//! failure, batching, and tier diagnostics. Everything runs against the
//! in-process tiers, so no network or credentials are needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use engram::batch::BatchRememberItem;
use engram::config::EngineConfig;
use engram::engine::MemoryEngine;
use engram::tiers::{MemoryTierAdapter, Tier, TierEnvironment, TierError, TierHealth};
use engram::types::{ContextRequest, MemoryId, MemoryQuery, MemoryRecord, MemoryResult};

fn config_for(tier: Tier) -> EngineConfig {
    EngineConfig {
        preferred_tier: Some(tier),
        auto_detect: false,
        ..Default::default()
    }
}

async fn engine_on(tier: Tier) -> MemoryEngine {
    let engine = MemoryEngine::with_environment(config_for(tier), TierEnvironment::default())
        .expect("valid config");
    engine.initialize().await.expect("initialize");
    engine
}

/// Adapter that fails remember/recall after a configurable number of
/// successful calls; lets tests break a tier mid-session.
struct FlakyTier {
    tier: Tier,
    inner: engram::tiers::MockTier,
    allowed: AtomicUsize,
}

impl FlakyTier {
    fn new(tier: Tier, allowed: usize) -> Self {
        Self {
            tier,
            inner: engram::tiers::MockTier::new(),
            allowed: AtomicUsize::new(allowed),
        }
    }

    fn take_permit(&self) -> Result<(), TierError> {
        let remaining = self.allowed.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(TierError::Unavailable {
                reason: "backend went away".to_string(),
            });
        }
        self.allowed.store(remaining - 1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MemoryTierAdapter for FlakyTier {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError> {
        self.take_permit()?;
        self.inner.remember(record).await
    }

    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError> {
        self.take_permit()?;
        self.inner.recall(query).await
    }

    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError> {
        self.inner.recent(tenant_id, agent_id, limit).await
    }

    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError> {
        self.inner.forget(id).await
    }

    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError> {
        self.inner.touch(ids).await
    }

    async fn health(&self) -> TierHealth {
        TierHealth {
            tier: self.tier,
            healthy: true,
            message: None,
            record_count: 0,
        }
    }
}

#[tokio::test]
async fn round_trip_on_every_builtin_tier() {
    for tier in [Tier::Smart, Tier::Basic, Tier::Mock] {
        let engine = engine_on(tier).await;

        let id = engine
            .remember("meeting notes from tuesday standup", "t1", None, None)
            .await
            .unwrap();

        let query = MemoryQuery::new("tuesday standup", "t1").with_threshold(0.1);
        let results = engine.recall(query).await.unwrap();
        assert!(
            results.iter().any(|r| r.record.id == id),
            "tier {tier} did not recall its own record"
        );

        assert!(engine.forget(&id).await.unwrap());
        assert!(!engine.forget(&id).await.unwrap());
    }
}

#[tokio::test]
async fn default_threshold_scenario() {
    let engine = engine_on(Tier::Mock).await;
    engine
        .remember("User prefers dark mode", "t1", None, None)
        .await
        .unwrap();

    // Substring match scores above the 0.7 default threshold
    let results = engine
        .recall(MemoryQuery::new("dark mode", "t1"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.content, "User prefers dark mode");
}

#[tokio::test]
async fn repeated_recall_is_stable_and_cached() {
    let engine = engine_on(Tier::Mock).await;
    engine
        .remember("User prefers dark mode", "t1", None, None)
        .await
        .unwrap();

    let query = MemoryQuery::new("dark mode", "t1");
    let first = engine.recall(query.clone()).await.unwrap();
    let second = engine.recall(query).await.unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].record.id, second[0].record.id);
    assert_eq!(first[0].score, second[0].score);

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.result_cache.hits, 1);
    // Cached reads still refresh access metadata
    let context = engine.get_context(ContextRequest::new("t1")).await.unwrap();
    assert_eq!(context.memories[0].access_count, 2);
}

#[tokio::test]
async fn tenants_are_isolated() {
    let engine = engine_on(Tier::Basic).await;
    engine
        .remember("tenant one secret", "t1", None, None)
        .await
        .unwrap();
    engine
        .remember("tenant two secret", "t2", None, None)
        .await
        .unwrap();

    let query = MemoryQuery::new("secret", "t1").with_threshold(0.1);
    let results = engine.recall(query).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.tenant_id, "t1");
}

#[tokio::test]
async fn mid_session_failure_falls_back_and_keeps_serving() {
    let engine = MemoryEngine::with_environment(config_for(Tier::Basic), TierEnvironment::default())
        .unwrap();
    // One successful write, then the tier breaks
    engine.register_adapter(Tier::Basic, Arc::new(FlakyTier::new(Tier::Basic, 1)));
    engine.initialize().await.unwrap();

    engine
        .remember("stored before the outage", "t1", None, None)
        .await
        .unwrap();
    assert_eq!(engine.active_tier(), Some(Tier::Basic));

    // This write fails on basic and lands on mock
    engine
        .remember("stored after the outage", "t1", None, None)
        .await
        .unwrap();
    assert_eq!(engine.active_tier(), Some(Tier::Mock));

    // The engine keeps serving from the fallback tier
    let query = MemoryQuery::new("after the outage", "t1").with_threshold(0.1);
    let results = engine.recall(query).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn exhausted_chain_is_terminal_until_reinitialized() {
    let engine = MemoryEngine::with_environment(config_for(Tier::Basic), TierEnvironment::default())
        .unwrap();
    engine.register_adapter(Tier::Basic, Arc::new(FlakyTier::new(Tier::Basic, 0)));
    engine.register_adapter(Tier::Mock, Arc::new(FlakyTier::new(Tier::Mock, 0)));
    engine.initialize().await.unwrap();

    let err = engine
        .remember("nowhere to go", "t1", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FALLBACK_EXHAUSTED");

    let err = engine
        .recall(MemoryQuery::new("anything", "t1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FALLBACK_EXHAUSTED");
}

#[tokio::test]
async fn batch_remember_and_recall_preserve_order() {
    let engine = engine_on(Tier::Mock).await;

    let items = vec![
        BatchRememberItem::new("alpha memo", "t1"),
        BatchRememberItem::new("   ", "t1"),
        BatchRememberItem::new("beta memo", "t2"),
        BatchRememberItem::new("gamma memo", "t1"),
    ];
    let results = engine.remember_batch(items).await;

    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().code(), "INVALID_CONTENT");
    assert!(results[2].is_ok());
    assert!(results[3].is_ok());

    let queries = vec![
        MemoryQuery::new("alpha memo", "t1"),
        MemoryQuery::new("beta memo", "t2"),
        MemoryQuery::new("missing memo", "t2").with_threshold(0.95),
    ];
    let recalled = engine.recall_batch(queries).await;
    assert_eq!(recalled[0].as_ref().unwrap().len(), 1);
    assert_eq!(recalled[1].as_ref().unwrap().len(), 1);
    assert!(recalled[2].as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_tier_round_trips_and_restores() {
    let engine = engine_on(Tier::Mock).await;

    for tier in [Tier::Smart, Tier::Basic, Tier::Mock] {
        let report = engine.test_tier(tier).await;
        assert!(report.success, "tier {tier}: {}", report.message);
        assert_eq!(engine.active_tier(), Some(Tier::Mock));
    }
}

#[tokio::test]
async fn stats_reflect_capabilities_and_metrics() {
    let engine = engine_on(Tier::Basic).await;
    engine
        .remember("User prefers dark mode", "t1", None, None)
        .await
        .unwrap();
    engine
        .recall(MemoryQuery::new("dark mode", "t1").with_threshold(0.5))
        .await
        .unwrap();

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.tier, Tier::Basic);
    assert_eq!(stats.capabilities.fallback_chain, [Tier::Mock]);
    assert!(stats.health.healthy);
    assert_eq!(stats.health.record_count, 1);
    assert!(stats.metrics.total_operations >= 2);
}

#[tokio::test]
async fn switch_tier_carries_no_data_across() {
    let engine = engine_on(Tier::Basic).await;
    engine
        .remember("only on basic", "t1", None, None)
        .await
        .unwrap();

    engine.switch_tier(Tier::Mock).await.unwrap();
    let results = engine
        .recall(MemoryQuery::new("only on basic", "t1").with_threshold(0.1))
        .await
        .unwrap();
    assert!(results.is_empty());

    // Switching back restores the previously stored data
    engine.switch_tier(Tier::Basic).await.unwrap();
    let results = engine
        .recall(MemoryQuery::new("only on basic", "t1").with_threshold(0.1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}
