//! Typed configuration
//!
//! Strongly-typed engine configuration with validation and defaults. Loaded
//! from JSON, overlaid with process environment variables.

use crate::error::EngineError;
use crate::tiers::Tier;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_max_query_time_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    10
}

fn default_housekeeping_interval_secs() -> u64 {
    300
}

fn default_slow_op_threshold_ms() -> u64 {
    100
}

fn default_embedding_cache_capacity() -> usize {
    2048
}

fn default_result_cache_capacity() -> usize {
    512
}

fn default_compression_threshold_bytes() -> usize {
    4096
}

/// Root engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Tier to use when auto-detection is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_tier: Option<Tier>,
    /// Detect the best available tier from the environment
    pub auto_detect: bool,
    /// Walk the fallback chain on tier failure
    pub enable_fallback: bool,
    /// Base TTL for cached recall results
    pub cache_ttl_seconds: u64,
    /// Deadline applied to every adapter call
    pub max_query_time_ms: u64,
    /// Concurrent requests per tenant partition in batch operations
    pub batch_size: usize,
    /// Interval between background housekeeping runs
    pub housekeeping_interval_secs: u64,
    /// Latency above which an operation is flagged as slow
    pub slow_op_threshold_ms: u64,
    /// Embedding cache capacity (entries)
    pub embedding_cache_capacity: usize,
    /// Result cache capacity (entries)
    pub result_cache_capacity: usize,
    /// Serialized size above which cached values are compressed
    pub compression_threshold_bytes: usize,
    /// Embedding provider settings for the advanced tier
    pub embedding: EmbeddingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_tier: None,
            auto_detect: true,
            enable_fallback: true,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_query_time_ms: default_max_query_time_ms(),
            batch_size: default_batch_size(),
            housekeeping_interval_secs: default_housekeeping_interval_secs(),
            slow_op_threshold_ms: default_slow_op_threshold_ms(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
            result_cache_capacity: default_result_cache_capacity(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| EngineError::Config {
            reason: format!("failed to read {}: {e}", path.as_ref().display()),
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| EngineError::Config {
            reason: format!("invalid config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay settings from process environment variables
    pub fn apply_env(mut self) -> Self {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("ENGRAM_EMBEDDING_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        if let Ok(tier) = std::env::var("ENGRAM_PREFERRED_TIER") {
            if let Ok(tier) = tier.parse() {
                self.preferred_tier = Some(tier);
                self.auto_detect = false;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::Config {
                reason: "batchSize must be greater than 0".to_string(),
            });
        }
        if self.max_query_time_ms == 0 {
            return Err(EngineError::Config {
                reason: "maxQueryTimeMs must be greater than 0".to_string(),
            });
        }
        if !self.auto_detect && self.preferred_tier.is_none() {
            return Err(EngineError::Config {
                reason: "preferredTier is required when autoDetect is disabled".to_string(),
            });
        }
        Ok(())
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible HTTP API
    #[default]
    OpenAi,
    /// Deterministic in-process hash projection
    Local,
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::OpenAi,
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions: crate::embedding::EMBEDDING_DIM_OPENAI_SMALL,
        }
    }
}
