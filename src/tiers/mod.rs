//! Memory tiers
//!
//! A tier is one interchangeable backend implementation of the memory
//! store, ordered by capability. Every tier satisfies the same
//! `MemoryTierAdapter` contract; the engine owns exactly one active tier at
//! a time and walks the registry's fallback chain when it fails.

pub mod advanced;
pub mod basic;
pub mod mock;
pub mod registry;
pub mod smart;

pub use advanced::AdvancedTier;
pub use basic::BasicTier;
pub use mock::MockTier;
pub use registry::{detect_best_tier, fallback_chain, TierCapabilities, TierEnvironment};
pub use smart::SmartTier;

use crate::embedding::EmbeddingError;
use crate::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use serde::{Deserialize, Serialize};

/// Backend tier, ordered from most to least capable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Full vector-search engine with a real embedding provider
    Advanced,
    /// Local-model tier, vector search without network access
    Smart,
    /// Keyword-only matching, no embeddings
    Basic,
    /// Pure in-memory stub, no prerequisites
    Mock,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advanced => "advanced",
            Self::Smart => "smart",
            Self::Basic => "basic",
            Self::Mock => "mock",
        }
    }

    /// All tiers, most capable first
    pub const ALL: [Tier; 4] = [Tier::Advanced, Tier::Smart, Tier::Basic, Tier::Mock];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "advanced" => Ok(Self::Advanced),
            "smart" => Ok(Self::Smart),
            "basic" => Ok(Self::Basic),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Failures inside a tier backend
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("Tier unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Storage error: {reason}")]
    Storage { reason: String },
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },
    #[error("Record not found: {id}")]
    NotFound { id: String },
}

/// Health report for one tier
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHealth {
    pub tier: Tier,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub record_count: u64,
}

/// Uniform capability interface every tier implements
#[async_trait::async_trait]
pub trait MemoryTierAdapter: Send + Sync {
    /// Which tier this adapter implements
    fn tier(&self) -> Tier;

    /// Persist a record, returning its id
    async fn remember(&self, record: &MemoryRecord) -> Result<MemoryId, TierError>;

    /// Ranked similarity search
    async fn recall(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, TierError>;

    /// Most recent records for a tenant/agent
    async fn recent(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, TierError>;

    /// Delete a record, returning it when it existed
    async fn forget(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, TierError>;

    /// Refresh last-accessed timestamps and bump access counters
    async fn touch(&self, ids: &[MemoryId]) -> Result<(), TierError>;

    /// Current health of the backend
    async fn health(&self) -> TierHealth;

    /// Periodic maintenance run by the engine's background ticker
    async fn housekeeping(&self) -> Result<(), TierError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tier_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::from_str(tier.as_str()).unwrap(), tier);
        }
        assert!(Tier::from_str("turbo").is_err());
    }

    #[test]
    fn test_tier_serde_names() {
        assert_eq!(serde_json::to_string(&Tier::Advanced).unwrap(), "\"advanced\"");
        let tier: Tier = serde_json::from_str("\"mock\"").unwrap();
        assert_eq!(tier, Tier::Mock);
    }
}
