//! Engine error taxonomy
//!
//! Errors carry a stable string code so callers and logs can match on the
//! failure class without parsing messages. Validation errors are surfaced
//! immediately and never retried; adapter failures are consumed by the
//! fallback walk when it is enabled.

use crate::tiers::{Tier, TierError};
use thiserror::Error;

/// Errors surfaced by the memory engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Memory content must not be empty")]
    InvalidContent,

    #[error("Recall query must not be empty")]
    InvalidQuery,

    #[error("Failed to initialize tier {tier}: {reason}")]
    Init { tier: Tier, reason: String },

    #[error("Remember failed on tier {tier}: {source}")]
    Remember {
        tier: Tier,
        #[source]
        source: TierError,
    },

    #[error("Recall failed on tier {tier}: {source}")]
    Recall {
        tier: Tier,
        #[source]
        source: TierError,
    },

    #[error("Context retrieval failed on tier {tier}: {source}")]
    Context {
        tier: Tier,
        #[source]
        source: TierError,
    },

    #[error("Forget failed on tier {tier}: {source}")]
    Forget {
        tier: Tier,
        #[source]
        source: TierError,
    },

    #[error("Failed to switch to tier {tier}: {reason}")]
    TierSwitch { tier: Tier, reason: String },

    #[error("Every tier in the fallback chain failed ({attempts} attempts)")]
    FallbackExhausted { attempts: usize },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl EngineError {
    /// Stable machine-readable code for this error class
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::InvalidContent => "INVALID_CONTENT",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::Init { .. } => "INIT_ERROR",
            Self::Remember { .. } => "REMEMBER_ERROR",
            Self::Recall { .. } => "RECALL_ERROR",
            Self::Context { .. } => "CONTEXT_ERROR",
            Self::Forget { .. } => "FORGET_ERROR",
            Self::TierSwitch { .. } => "TIER_SWITCH_ERROR",
            Self::FallbackExhausted { .. } => "FALLBACK_EXHAUSTED",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// True for caller-input errors that must never trigger a retry
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidContent | Self::InvalidQuery | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::NotInitialized.code(), "NOT_INITIALIZED");
        assert_eq!(EngineError::InvalidContent.code(), "INVALID_CONTENT");
        assert_eq!(
            EngineError::FallbackExhausted { attempts: 4 }.code(),
            "FALLBACK_EXHAUSTED"
        );
        assert_eq!(
            EngineError::TierSwitch {
                tier: Tier::Basic,
                reason: "nope".to_string()
            }
            .code(),
            "TIER_SWITCH_ERROR"
        );
    }

    #[test]
    fn test_validation_classification() {
        assert!(EngineError::InvalidContent.is_validation());
        assert!(EngineError::InvalidQuery.is_validation());
        assert!(!EngineError::NotInitialized.is_validation());
        assert!(!EngineError::FallbackExhausted { attempts: 1 }.is_validation());
    }
}
