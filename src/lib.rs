//! engram library
//!
//! Tiered memory store for AI agents. A single `MemoryEngine` fronts four
//! interchangeable backend tiers (advanced, smart, basic, mock), detects the
//! best available one at startup, and falls back down a fixed chain when the
//! active tier fails. Every tier is wrapped in a performance layer adding an
//! embedding cache, a query-result cache, and operation metrics.

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod perf;
pub mod store;
pub mod tiers;
pub mod types;

pub use batch::BatchRememberItem;
pub use config::EngineConfig;
pub use engine::{EngineStats, MemoryEngine, TierTestReport};
pub use error::EngineError;
pub use tiers::{MemoryTierAdapter, Tier, TierError};
pub use types::{
    ContextRequest, MemoryContext, MemoryId, MemoryQuery, MemoryRecord, MemoryResult, MemoryType,
    RememberOptions,
};
