//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `remember` -- store a memory for a tenant
//! - `recall` -- ranked similarity search
//! - `context` -- recent memories with a per-type summary
//! - `forget` -- delete a memory by id
//! - `tiers` -- list tier capabilities and the detected best tier
//! - `test` -- run a diagnostic round trip against a tier
//! - `stats` -- print active tier, cache, and metric statistics

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::engine::MemoryEngine;
use crate::tiers::{detect_best_tier, registry, Tier, TierEnvironment};
use crate::types::{ContextRequest, MemoryId, MemoryQuery, MemoryType, RememberOptions};

/// Tiered memory store for AI agents.
#[derive(Parser, Debug)]
#[command(
    name = "engram",
    version = env!("CARGO_PKG_VERSION"),
    about = "Engram - tiered memory store for AI agents"
)]
pub struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a memory. Type and importance are inferred when omitted.
    Remember {
        /// The content to remember.
        content: String,

        /// Tenant the memory belongs to.
        #[arg(short, long)]
        tenant: String,

        /// Agent within the tenant, if any.
        #[arg(long)]
        agent: Option<String>,

        /// Memory type (fact, procedure, preference, personality, thread, task, emotion).
        #[arg(long = "type")]
        memory_type: Option<MemoryType>,

        /// Importance in 0..=1.
        #[arg(long)]
        importance: Option<f32>,

        /// Tag to attach; may be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Seconds until the memory expires.
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Ranked similarity search over a tenant's memories.
    Recall {
        /// Query text.
        query: String,

        /// Tenant to search.
        #[arg(short, long)]
        tenant: String,

        /// Restrict to one agent's memories.
        #[arg(long)]
        agent: Option<String>,

        /// Maximum number of results (default: 10).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum relevance score in 0..=1 (default: 0.7).
        #[arg(long)]
        threshold: Option<f32>,

        /// Restrict to one memory type.
        #[arg(long = "type")]
        memory_type: Option<MemoryType>,

        /// Discount older memories when ranking.
        #[arg(long)]
        time_decay: bool,
    },

    /// Recent memories for a tenant with a per-type summary.
    Context {
        /// Tenant to summarize.
        #[arg(short, long)]
        tenant: String,

        /// Restrict to one agent's memories.
        #[arg(long)]
        agent: Option<String>,

        /// Maximum number of memories (default: 20).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a memory by id.
    Forget {
        /// Id of the memory to delete.
        id: String,
    },

    /// List tier capabilities and the detected best tier.
    Tiers,

    /// Run a diagnostic round trip against a tier.
    Test {
        /// Tier to test (advanced, smart, basic, mock).
        tier: Tier,
    },

    /// Print active tier, cache, and metric statistics.
    Stats,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Dispatch a parsed CLI invocation.
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_path(path)?,
        None => EngineConfig::default(),
    }
    .apply_env();

    // `tiers` only inspects the environment; no engine needed.
    if matches!(cli.command, Command::Tiers) {
        handle_tiers();
        return Ok(());
    }

    let engine = MemoryEngine::new(config)?;
    engine.initialize().await?;

    match cli.command {
        Command::Remember {
            content,
            tenant,
            agent,
            memory_type,
            importance,
            tags,
            ttl_secs,
        } => {
            let options = RememberOptions {
                memory_type,
                importance,
                tags,
                ttl_secs,
            };
            let id = engine
                .remember(&content, &tenant, agent.as_deref(), Some(options))
                .await?;
            println!("{id}");
        }

        Command::Recall {
            query,
            tenant,
            agent,
            limit,
            threshold,
            memory_type,
            time_decay,
        } => {
            let mut q = MemoryQuery::new(query, tenant).with_time_decay(time_decay);
            if let Some(agent) = agent {
                q = q.with_agent(agent);
            }
            if let Some(limit) = limit {
                q = q.with_limit(limit);
            }
            if let Some(threshold) = threshold {
                q = q.with_threshold(threshold);
            }
            if let Some(memory_type) = memory_type {
                q = q.with_type(memory_type);
            }

            let results = engine.recall(q).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Command::Context {
            tenant,
            agent,
            limit,
        } => {
            let mut request = ContextRequest::new(tenant);
            request.agent_id = agent;
            if let Some(limit) = limit {
                request.limit = limit;
            }

            let context = engine.get_context(request).await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }

        Command::Forget { id } => {
            let deleted = engine.forget(&MemoryId::from_string(id)).await?;
            if deleted {
                println!("deleted");
            } else {
                eprintln!("not found");
                std::process::exit(1);
            }
        }

        Command::Test { tier } => {
            let report = engine.test_tier(tier).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }

        Command::Stats => {
            let stats = engine.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Tiers => unreachable!("handled above"),
    }

    engine.shutdown().await;
    Ok(())
}

/// Run the `tiers` subcommand.
fn handle_tiers() {
    let env = TierEnvironment::from_process_env();
    let detected = detect_best_tier(&env);

    println!("Available tiers (detected: {detected})");
    println!("=======================================");
    for tier in Tier::ALL {
        let caps = registry::describe(tier);
        let marker = if tier == detected { "*" } else { " " };
        println!("{marker} {tier:<10} {}", caps.message);
        if caps.prerequisites.is_empty() {
            println!("             requires: nothing");
        } else {
            println!("             requires: {}", caps.prerequisites.join(", "));
        }
        if !caps.fallback_chain.is_empty() {
            let chain: Vec<&str> = caps.fallback_chain.iter().map(|t| t.as_str()).collect();
            println!("             falls back to: {}", chain.join(" -> "));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_remember() {
        let cli = Cli::try_parse_from([
            "engram", "remember", "dark mode", "--tenant", "t1", "--tag", "ui", "--tag", "prefs",
        ])
        .unwrap();
        match cli.command {
            Command::Remember {
                ref content,
                ref tenant,
                ref tags,
                ..
            } => {
                assert_eq!(content, "dark mode");
                assert_eq!(tenant, "t1");
                assert_eq!(tags, &["ui", "prefs"]);
            }
            other => panic!("Expected Remember, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_remember_requires_tenant() {
        assert!(Cli::try_parse_from(["engram", "remember", "dark mode"]).is_err());
    }

    #[test]
    fn test_cli_recall_with_options() {
        let cli = Cli::try_parse_from([
            "engram",
            "recall",
            "dark mode",
            "--tenant",
            "t1",
            "--limit",
            "5",
            "--threshold",
            "0.3",
            "--type",
            "preference",
            "--time-decay",
        ])
        .unwrap();
        match cli.command {
            Command::Recall {
                limit,
                threshold,
                memory_type,
                time_decay,
                ..
            } => {
                assert_eq!(limit, Some(5));
                assert_eq!(threshold, Some(0.3));
                assert_eq!(memory_type, Some(MemoryType::Preference));
                assert!(time_decay);
            }
            other => panic!("Expected Recall, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_type() {
        assert!(Cli::try_parse_from([
            "engram", "recall", "x", "--tenant", "t1", "--type", "opinion"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_test_parses_tier() {
        let cli = Cli::try_parse_from(["engram", "test", "smart"]).unwrap();
        match cli.command {
            Command::Test { tier } => assert_eq!(tier, Tier::Smart),
            other => panic!("Expected Test, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_tiers_and_stats() {
        assert!(matches!(
            Cli::try_parse_from(["engram", "tiers"]).unwrap().command,
            Command::Tiers
        ));
        assert!(matches!(
            Cli::try_parse_from(["engram", "stats"]).unwrap().command,
            Command::Stats
        ));
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["engram", "tiers", "--config", "/tmp/engram.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/engram.json")));
    }
}
