//! Tier capability registry
//!
//! Static description of each tier's prerequisites, human-readable message,
//! and fixed fallback chain, plus environment-based detection of the best
//! available tier. Detection never fails: if nothing can be probed the
//! answer is `Tier::Mock`, which has no prerequisites.

use super::Tier;
use serde::Serialize;
use tracing::debug;

/// Environment variables consulted for an embedding API key, in order
const API_KEY_ENV_VARS: [&str; 2] = ["ENGRAM_EMBEDDING_API_KEY", "OPENAI_API_KEY"];

/// Environment variable signalling a usable local embedding model
const LOCAL_MODEL_ENV_VAR: &str = "ENGRAM_LOCAL_MODEL";

/// Resources available to tier detection
#[derive(Debug, Clone, Default)]
pub struct TierEnvironment {
    /// Credential for a hosted embedding API
    pub embedding_api_key: Option<String>,
    /// Whether a local embedding model is available
    pub local_model: bool,
    /// Whether in-process storage is usable
    pub storage_writable: bool,
}

impl TierEnvironment {
    /// Probe the process environment
    pub fn from_process_env() -> Self {
        let embedding_api_key = API_KEY_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        let local_model = std::env::var(LOCAL_MODEL_ENV_VAR)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            embedding_api_key,
            local_model,
            storage_writable: true,
        }
    }

    /// Environment with every prerequisite satisfied
    pub fn full(api_key: impl Into<String>) -> Self {
        Self {
            embedding_api_key: Some(api_key.into()),
            local_model: true,
            storage_writable: true,
        }
    }
}

/// Static capability descriptor for one tier
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCapabilities {
    pub tier: Tier,
    pub message: &'static str,
    pub prerequisites: &'static [&'static str],
    pub fallback_chain: &'static [Tier],
}

const ADVANCED_CHAIN: [Tier; 3] = [Tier::Smart, Tier::Basic, Tier::Mock];
const SMART_CHAIN: [Tier; 2] = [Tier::Basic, Tier::Mock];
const BASIC_CHAIN: [Tier; 1] = [Tier::Mock];
const MOCK_CHAIN: [Tier; 0] = [];

/// Describe a tier's prerequisites, message, and fallback chain
pub fn describe(tier: Tier) -> TierCapabilities {
    match tier {
        Tier::Advanced => TierCapabilities {
            tier,
            message: "Full vector search with a hosted embedding provider",
            prerequisites: &["embedding API credential", "writable storage"],
            fallback_chain: &ADVANCED_CHAIN,
        },
        Tier::Smart => TierCapabilities {
            tier,
            message: "Local-model vector search, no network access",
            prerequisites: &["local embedding model"],
            fallback_chain: &SMART_CHAIN,
        },
        Tier::Basic => TierCapabilities {
            tier,
            message: "Keyword matching over in-process storage",
            prerequisites: &["writable storage"],
            fallback_chain: &BASIC_CHAIN,
        },
        Tier::Mock => TierCapabilities {
            tier,
            message: "In-memory stub, always available",
            prerequisites: &[],
            fallback_chain: &MOCK_CHAIN,
        },
    }
}

/// Ordered tiers tried after `tier` fails
pub fn fallback_chain(tier: Tier) -> &'static [Tier] {
    describe(tier).fallback_chain
}

/// Highest-capability tier whose prerequisites hold in `env`
pub fn detect_best_tier(env: &TierEnvironment) -> Tier {
    let tier = if env.embedding_api_key.is_some() && env.storage_writable {
        Tier::Advanced
    } else if env.local_model {
        Tier::Smart
    } else if env.storage_writable {
        Tier::Basic
    } else {
        Tier::Mock
    };

    debug!(tier = %tier, "Detected best available tier");
    tier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_terminate_at_mock() {
        for tier in Tier::ALL {
            let chain = fallback_chain(tier);
            if tier == Tier::Mock {
                assert!(chain.is_empty());
            } else {
                assert_eq!(chain.last(), Some(&Tier::Mock));
            }
        }
    }

    #[test]
    fn test_chains_are_acyclic() {
        for tier in Tier::ALL {
            let chain = fallback_chain(tier);
            assert!(!chain.contains(&tier));
            // Strictly descending capability, no repeats
            for window in chain.windows(2) {
                assert_ne!(window[0], window[1]);
            }
        }
    }

    #[test]
    fn test_mock_has_no_prerequisites() {
        assert!(describe(Tier::Mock).prerequisites.is_empty());
    }

    #[test]
    fn test_detection_prefers_advanced_with_credentials() {
        let env = TierEnvironment::full("sk-test");
        assert_eq!(detect_best_tier(&env), Tier::Advanced);
    }

    #[test]
    fn test_detection_falls_through() {
        let env = TierEnvironment {
            embedding_api_key: None,
            local_model: true,
            storage_writable: true,
        };
        assert_eq!(detect_best_tier(&env), Tier::Smart);

        let env = TierEnvironment {
            embedding_api_key: None,
            local_model: false,
            storage_writable: true,
        };
        assert_eq!(detect_best_tier(&env), Tier::Basic);

        let env = TierEnvironment {
            embedding_api_key: None,
            local_model: false,
            storage_writable: false,
        };
        assert_eq!(detect_best_tier(&env), Tier::Mock);
    }

    #[test]
    fn test_detection_never_fails_on_default_env() {
        // Default has nothing set; detection must still return a tier
        let tier = detect_best_tier(&TierEnvironment::default());
        assert_eq!(tier, Tier::Mock);
    }
}
