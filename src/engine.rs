//! Memory engine orchestrator
//!
//! Owns the active tier adapter, walks the registry's fallback chain on
//! failure, and exposes the public remember/recall/context/forget surface.
//! Every adapter the engine constructs is wrapped in the performance
//! decorator, so caching and metrics apply uniformly across tiers.
//!
//! State machine: `Uninitialized → Initializing(tier) → Ready(tier)`. A
//! caught operation failure with fallback enabled re-enters
//! `Initializing(next)` and lands on `Ready(next)`; exhausting the chain is
//! terminal (`Unusable`) until `initialize` is called again.

use crate::cache::{CacheConfig, CacheStats};
use crate::config::{EmbeddingBackend, EngineConfig};
use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};
use crate::error::EngineError;
use crate::perf::{
    CachedEmbeddingProvider, MetricsRecorder, MetricsSummary, PerfConfig, PerformanceDecorator,
};
use crate::store::InMemoryVectorStore;
use crate::tiers::{
    registry, AdvancedTier, BasicTier, MemoryTierAdapter, MockTier, SmartTier, Tier,
    TierCapabilities, TierEnvironment, TierError, TierHealth,
};
use crate::types::{
    ContextRequest, MemoryContext, MemoryId, MemoryQuery, MemoryRecord, MemoryResult, MemoryType,
    Operation, RememberOptions,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tenant used for diagnostic round trips
const DIAGNOSTIC_TENANT: &str = "__engram_diagnostic__";

/// Engine lifecycle state
enum EngineState {
    Uninitialized,
    Initializing(Tier),
    Ready {
        tier: Tier,
        adapter: Arc<PerformanceDecorator>,
    },
    Unusable {
        attempts: usize,
    },
}

struct HousekeepingTask {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Diagnostic result from `test_tier`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierTestReport {
    pub tier: Tier,
    pub success: bool,
    pub message: String,
}

/// Snapshot returned by `get_stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub tier: Tier,
    pub capabilities: TierCapabilities,
    pub health: TierHealth,
    pub metrics: MetricsSummary,
    pub result_cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_cache: Option<CacheStats>,
}

/// Orchestrator over the tier adapters
pub struct MemoryEngine {
    config: EngineConfig,
    environment: TierEnvironment,
    state: RwLock<EngineState>,
    adapters: RwLock<HashMap<Tier, Arc<PerformanceDecorator>>>,
    recorder: Arc<MetricsRecorder>,
    housekeeping: Mutex<Option<HousekeepingTask>>,
}

impl MemoryEngine {
    /// Create an engine probing the process environment for tier detection
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_environment(config, TierEnvironment::from_process_env())
    }

    /// Create an engine with an explicit detection environment
    pub fn with_environment(
        config: EngineConfig,
        environment: TierEnvironment,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let recorder = Arc::new(MetricsRecorder::new(config.slow_op_threshold_ms));
        Ok(Self {
            config,
            environment,
            state: RwLock::new(EngineState::Uninitialized),
            adapters: RwLock::new(HashMap::new()),
            recorder,
            housekeeping: Mutex::new(None),
        })
    }

    /// Supply a custom adapter for a tier. The adapter is wrapped in the
    /// performance decorator like every engine-built one.
    pub fn register_adapter(&self, tier: Tier, adapter: Arc<dyn MemoryTierAdapter>) {
        let decorated = Arc::new(PerformanceDecorator::new(
            adapter,
            self.recorder.clone(),
            self.perf_config(),
        ));
        self.adapters.write().insert(tier, decorated);
    }

    /// Select and activate a tier. With `autoDetect` the registry picks the
    /// highest tier whose prerequisites hold; otherwise the configured
    /// preferred tier is used. Fallback (when enabled) walks the chain if
    /// activation fails.
    pub async fn initialize(&self) -> Result<Tier, EngineError> {
        let desired = if self.config.auto_detect {
            registry::detect_best_tier(&self.environment)
        } else {
            self.config.preferred_tier.unwrap_or(Tier::Mock)
        };

        match self.activate(desired).await {
            Ok(_) => {
                info!(tier = %desired, "Memory engine initialized");
                Ok(desired)
            }
            Err(first_err) => {
                if !self.config.enable_fallback {
                    *self.state.write() = EngineState::Uninitialized;
                    return Err(first_err);
                }

                warn!(tier = %desired, error = %first_err, "Tier activation failed, walking fallback chain");
                let chain = registry::fallback_chain(desired);
                for &tier in chain {
                    match self.activate(tier).await {
                        Ok(_) => {
                            info!(tier = %tier, "Memory engine initialized on fallback tier");
                            return Ok(tier);
                        }
                        Err(e) => {
                            warn!(tier = %tier, error = %e, "Fallback tier activation failed");
                        }
                    }
                }

                let attempts = chain.len() + 1;
                *self.state.write() = EngineState::Unusable { attempts };
                Err(EngineError::FallbackExhausted { attempts })
            }
        }
    }

    /// Store a memory. Missing options are derived from the content by
    /// keyword heuristics.
    pub async fn remember(
        &self,
        content: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
        options: Option<RememberOptions>,
    ) -> Result<MemoryId, EngineError> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidContent);
        }

        let mut record = MemoryRecord::new(content, tenant_id);
        record.agent_id = agent_id.map(|a| a.to_string());
        if let Some(options) = options {
            if let Some(memory_type) = options.memory_type {
                record.memory_type = memory_type;
            }
            if let Some(importance) = options.importance {
                record.importance = importance.clamp(0.0, 1.0);
            }
            if !options.tags.is_empty() {
                record.tags = options.tags;
                record.tags.sort();
                record.tags.dedup();
            }
            record.ttl_secs = options.ttl_secs;
        }

        self.run_with_fallback(Operation::Remember, |adapter| {
            let record = record.clone();
            async move { adapter.remember(&record).await }
        })
        .await
    }

    /// Ranked recall. Results coming from the result cache still refresh
    /// each record's access metadata.
    pub async fn recall(&self, query: MemoryQuery) -> Result<Vec<MemoryResult>, EngineError> {
        if query.text.trim().is_empty() {
            return Err(EngineError::InvalidQuery);
        }

        self.run_with_fallback(Operation::Recall, |adapter| {
            let query = query.clone();
            async move { adapter.recall(&query).await }
        })
        .await
    }

    /// Recent records for a tenant/agent with a per-type summary
    pub async fn get_context(&self, request: ContextRequest) -> Result<MemoryContext, EngineError> {
        let memories = self
            .run_with_fallback(Operation::Context, |adapter| {
                let request = request.clone();
                async move {
                    adapter
                        .recent(&request.tenant_id, request.agent_id.as_deref(), request.limit)
                        .await
                }
            })
            .await?;

        Ok(MemoryContext {
            summary: summarize(&memories),
            memories,
        })
    }

    /// Delete a record; false when it did not exist
    pub async fn forget(&self, id: &MemoryId) -> Result<bool, EngineError> {
        let removed = self
            .run_with_fallback(Operation::Forget, |adapter| {
                let id = id.clone();
                async move { adapter.forget(&id).await }
            })
            .await?;
        Ok(removed.is_some())
    }

    /// Manual tier override; reinitializes when different from the current
    /// tier. On failure the previously active tier stays active.
    pub async fn switch_tier(&self, tier: Tier) -> Result<(), EngineError> {
        let previous = self.ready_snapshot();
        if previous.as_ref().map(|(t, _)| *t) == Some(tier) {
            return Ok(());
        }

        match self.activate(tier).await {
            Ok(_) => {
                info!(tier = %tier, "Switched active tier");
                Ok(())
            }
            Err(e) => {
                match previous {
                    Some((prev_tier, prev_adapter)) => {
                        *self.state.write() = EngineState::Ready {
                            tier: prev_tier,
                            adapter: prev_adapter.clone(),
                        };
                        self.start_housekeeping(prev_tier, prev_adapter);
                    }
                    None => *self.state.write() = EngineState::Uninitialized,
                }
                Err(EngineError::TierSwitch {
                    tier,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Diagnostic remember → recall → forget round trip against a tier.
    /// Testing a non-active tier switches to it and always switches back.
    pub async fn test_tier(&self, tier: Tier) -> TierTestReport {
        let previous = match self.ready_snapshot() {
            Some((t, _)) => t,
            None => {
                return TierTestReport {
                    tier,
                    success: false,
                    message: "engine is not initialized".to_string(),
                }
            }
        };

        if previous != tier {
            if let Err(e) = self.switch_tier(tier).await {
                return TierTestReport {
                    tier,
                    success: false,
                    message: format!("could not switch to tier: {e}"),
                };
            }
        }

        // The diagnostic calls go straight to the tier's own adapter; a
        // broken tier must not be papered over by the fallback walk.
        let report = match self.build_adapter(tier) {
            Ok(adapter) => run_diagnostic(tier, adapter).await,
            Err(e) => TierTestReport {
                tier,
                success: false,
                message: format!("could not construct adapter: {e}"),
            },
        };

        if previous != tier {
            if let Err(e) = self.switch_tier(previous).await {
                warn!(tier = %previous, error = %e, "Failed to restore previous tier after diagnostic");
            }
        }

        report
    }

    /// Active tier, its capabilities, and engine statistics
    pub async fn get_stats(&self) -> Result<EngineStats, EngineError> {
        let (tier, adapter) = self.active()?;
        Ok(EngineStats {
            tier,
            capabilities: registry::describe(tier),
            health: adapter.health().await,
            metrics: self.recorder.summary(),
            result_cache: adapter.result_cache_stats(),
            embedding_cache: adapter.embedding_cache_stats(),
        })
    }

    /// Currently active tier, if any
    pub fn active_tier(&self) -> Option<Tier> {
        self.ready_snapshot().map(|(tier, _)| tier)
    }

    /// Retained operation metrics, oldest first
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.recorder.clone()
    }

    /// Batch fan-out width from the configuration
    pub(crate) fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Cancel housekeeping and drop the active adapter
    pub async fn shutdown(&self) {
        self.stop_housekeeping();
        *self.state.write() = EngineState::Uninitialized;
        info!("Memory engine shut down");
    }

    // ---- internals ----

    fn ready_snapshot(&self) -> Option<(Tier, Arc<PerformanceDecorator>)> {
        match &*self.state.read() {
            EngineState::Ready { tier, adapter } => Some((*tier, adapter.clone())),
            _ => None,
        }
    }

    fn active(&self) -> Result<(Tier, Arc<PerformanceDecorator>), EngineError> {
        match &*self.state.read() {
            EngineState::Ready { tier, adapter } => Ok((*tier, adapter.clone())),
            EngineState::Unusable { attempts } => Err(EngineError::FallbackExhausted {
                attempts: *attempts,
            }),
            EngineState::Uninitialized | EngineState::Initializing(_) => {
                Err(EngineError::NotInitialized)
            }
        }
    }

    fn perf_config(&self) -> PerfConfig {
        PerfConfig {
            result_cache: CacheConfig {
                capacity: self.config.result_cache_capacity,
                compression_threshold_bytes: Some(self.config.compression_threshold_bytes),
            },
            result_ttl_secs: self.config.cache_ttl_seconds,
        }
    }

    /// Construct (or reuse) the adapter for a tier and make it active
    async fn activate(&self, tier: Tier) -> Result<Arc<PerformanceDecorator>, EngineError> {
        {
            // In-flight calls keep their snapshot; an existing Ready state
            // stays visible until the replacement adapter is ready.
            let mut state = self.state.write();
            if !matches!(&*state, EngineState::Ready { .. }) {
                *state = EngineState::Initializing(tier);
            }
        }

        let adapter = self.build_adapter(tier)?;
        let health = adapter.health().await;
        if !health.healthy {
            return Err(EngineError::Init {
                tier,
                reason: health
                    .message
                    .unwrap_or_else(|| "tier reported unhealthy".to_string()),
            });
        }

        *self.state.write() = EngineState::Ready {
            tier,
            adapter: adapter.clone(),
        };
        self.start_housekeeping(tier, adapter.clone());
        debug!(tier = %tier, "Tier activated");
        Ok(adapter)
    }

    fn build_adapter(&self, tier: Tier) -> Result<Arc<PerformanceDecorator>, EngineError> {
        if let Some(existing) = self.adapters.read().get(&tier) {
            return Ok(existing.clone());
        }

        let perf = self.perf_config();
        let decorated = match tier {
            Tier::Advanced => {
                let raw: Arc<dyn EmbeddingProvider> = match self.config.embedding.provider {
                    EmbeddingBackend::OpenAi => {
                        let api_key = self
                            .config
                            .embedding
                            .api_key
                            .clone()
                            .or_else(|| self.environment.embedding_api_key.clone())
                            .ok_or_else(|| EngineError::Init {
                                tier,
                                reason: "no embedding API credential available".to_string(),
                            })?;
                        Arc::new(
                            OpenAiEmbeddingProvider::new(api_key)
                                .with_model(
                                    self.config.embedding.model.clone(),
                                    self.config.embedding.dimensions,
                                )
                                .with_base_url(self.config.embedding.base_url.clone()),
                        )
                    }
                    EmbeddingBackend::Local => {
                        Arc::new(HashEmbeddingProvider::new(self.config.embedding.dimensions))
                    }
                };

                let cached = Arc::new(CachedEmbeddingProvider::new(
                    raw,
                    self.config.embedding_cache_capacity,
                ));
                let inner = AdvancedTier::new(
                    cached.clone() as Arc<dyn EmbeddingProvider>,
                    Arc::new(InMemoryVectorStore::new()),
                );
                PerformanceDecorator::new(Arc::new(inner), self.recorder.clone(), perf)
                    .with_embedding_cache(cached)
            }
            Tier::Smart => {
                let cached = Arc::new(CachedEmbeddingProvider::new(
                    Arc::new(HashEmbeddingProvider::default()),
                    self.config.embedding_cache_capacity,
                ));
                let inner = SmartTier::with_embedder(cached.clone() as Arc<dyn EmbeddingProvider>);
                PerformanceDecorator::new(Arc::new(inner), self.recorder.clone(), perf)
                    .with_embedding_cache(cached)
            }
            Tier::Basic => {
                PerformanceDecorator::new(Arc::new(BasicTier::new()), self.recorder.clone(), perf)
            }
            Tier::Mock => {
                PerformanceDecorator::new(Arc::new(MockTier::new()), self.recorder.clone(), perf)
            }
        };

        let adapter = Arc::new(decorated);
        self.adapters.write().insert(tier, adapter.clone());
        Ok(adapter)
    }

    /// Execute an operation against the active adapter, retrying the whole
    /// call once per tier down the fallback chain. The iteration is bounded
    /// by the chain length; exhausting it is terminal until reinitialized.
    async fn run_with_fallback<T, F, Fut>(
        &self,
        op: Operation,
        mut call: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(Arc<PerformanceDecorator>) -> Fut,
        Fut: Future<Output = Result<T, TierError>>,
    {
        let (mut tier, mut adapter) = self.active()?;
        let deadline = Duration::from_millis(self.config.max_query_time_ms);
        let mut chain = registry::fallback_chain(tier).iter();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let failure = match tokio::time::timeout(deadline, call(adapter.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => TierError::Timeout {
                    ms: self.config.max_query_time_ms,
                },
            };

            warn!(op = %op, tier = %tier, error = %failure, "Tier operation failed");

            if !self.config.enable_fallback {
                return Err(wrap_tier_error(op, tier, failure));
            }

            loop {
                match chain.next() {
                    None => {
                        self.stop_housekeeping();
                        *self.state.write() = EngineState::Unusable { attempts };
                        return Err(EngineError::FallbackExhausted { attempts });
                    }
                    Some(&next) => match self.activate(next).await {
                        Ok(next_adapter) => {
                            info!(from = %tier, to = %next, "Fell back to next tier");
                            tier = next;
                            adapter = next_adapter;
                            break;
                        }
                        Err(e) => {
                            warn!(tier = %next, error = %e, "Fallback tier activation failed");
                        }
                    },
                }
            }
        }
    }

    fn start_housekeeping(&self, tier: Tier, adapter: Arc<PerformanceDecorator>) {
        self.stop_housekeeping();

        let token = CancellationToken::new();
        let child = token.clone();
        let period = Duration::from_secs(self.config.housekeeping_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = adapter.housekeeping().await {
                            warn!(tier = %tier, error = %e, "Housekeeping run failed");
                        }
                    }
                }
            }
            debug!(tier = %tier, "Housekeeping ticker stopped");
        });

        *self.housekeeping.lock() = Some(HousekeepingTask {
            token,
            _handle: handle,
        });
    }

    fn stop_housekeeping(&self) {
        if let Some(task) = self.housekeeping.lock().take() {
            task.token.cancel();
        }
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.stop_housekeeping();
    }
}

/// Remember → recall → forget round trip run directly against one tier's
/// adapter, so the result reflects that tier alone.
async fn run_diagnostic(tier: Tier, adapter: Arc<PerformanceDecorator>) -> TierTestReport {
    let marker = format!("diagnostic round trip {}", Uuid::new_v4());
    let record = MemoryRecord::new(marker.clone(), DIAGNOSTIC_TENANT);

    let id = match adapter.remember(&record).await {
        Ok(id) => id,
        Err(e) => {
            return TierTestReport {
                tier,
                success: false,
                message: format!("remember failed: {e}"),
            }
        }
    };

    let query = MemoryQuery::new(marker, DIAGNOSTIC_TENANT).with_threshold(0.1);
    let found = match adapter.recall(&query).await {
        Ok(results) => results.iter().any(|r| r.record.id == id),
        Err(e) => {
            return TierTestReport {
                tier,
                success: false,
                message: format!("recall failed: {e}"),
            }
        }
    };

    if let Err(e) = adapter.forget(&id).await {
        return TierTestReport {
            tier,
            success: false,
            message: format!("forget failed: {e}"),
        };
    }

    if found {
        TierTestReport {
            tier,
            success: true,
            message: "remember/recall/forget round trip succeeded".to_string(),
        }
    } else {
        TierTestReport {
            tier,
            success: false,
            message: "stored record was not returned by recall".to_string(),
        }
    }
}

fn wrap_tier_error(op: Operation, tier: Tier, source: TierError) -> EngineError {
    match op {
        Operation::Remember => EngineError::Remember { tier, source },
        Operation::Recall => EngineError::Recall { tier, source },
        Operation::Context => EngineError::Context { tier, source },
        Operation::Forget => EngineError::Forget { tier, source },
    }
}

/// Render a per-type count summary, most frequent type first
fn summarize(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "no memories".to_string();
    }

    let mut counts: HashMap<MemoryType, usize> = HashMap::new();
    for memory in memories {
        *counts.entry(memory.memory_type).or_insert(0) += 1;
    }

    let mut counted: Vec<(MemoryType, usize)> = counts.into_iter().collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

    let parts: Vec<String> = counted
        .iter()
        .map(|(t, n)| format!("{n} {t}"))
        .collect();

    format!("{} memories: {}", memories.len(), parts.join(", "))
}
