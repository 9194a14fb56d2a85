//! Core memory types
//!
//! Records, queries, ranked results, and the telemetry record emitted for
//! every completed operation. Also hosts the keyword heuristics used to
//! derive defaults for `remember` calls that omit a memory type or
//! importance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of results returned by a recall
pub const RECALL_LIMIT_DEFAULT: usize = 10;

/// Default minimum relevance score for recall results
pub const RECALL_THRESHOLD_DEFAULT: f32 = 0.7;

/// Base importance assigned when no cue words are found
pub const IMPORTANCE_BASE: f32 = 0.5;

/// Unique identifier for a memory record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Generate a new unique memory ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a memory ID from a string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MemoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Category of a remembered fact or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Procedure,
    Preference,
    Personality,
    Thread,
    Task,
    Emotion,
}

impl MemoryType {
    /// Get the type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Procedure => "procedure",
            Self::Preference => "preference",
            Self::Personality => "personality",
            Self::Thread => "thread",
            Self::Task => "task",
            Self::Emotion => "emotion",
        }
    }

    /// Classify content by keyword cues, defaulting to `Fact`
    pub fn infer(content: &str) -> Self {
        let lower = content.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["how to", "step ", "steps", "procedure", "instructions"]) {
            Self::Procedure
        } else if has(&["prefer", "favorite", "favourite", "likes", "dislikes", "hates"]) {
            Self::Preference
        } else if has(&["personality", "my name is", "i am a", "identity"]) {
            Self::Personality
        } else if has(&["todo", "task", "need to", "deadline", "due "]) {
            Self::Task
        } else if has(&["feel", "feeling", "happy", "sad", "angry", "anxious", "excited"]) {
            Self::Emotion
        } else if has(&["conversation", "discussed", "we talked", "thread"]) {
            Self::Thread
        } else {
            Self::Fact
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fact" => Ok(Self::Fact),
            "procedure" => Ok(Self::Procedure),
            "preference" => Ok(Self::Preference),
            "personality" => Ok(Self::Personality),
            "thread" => Ok(Self::Thread),
            "task" => Ok(Self::Task),
            "emotion" => Ok(Self::Emotion),
            other => Err(format!("unknown memory type: {other}")),
        }
    }
}

/// Estimate importance from cue words, clamped to 0..=1
pub fn infer_importance(content: &str) -> f32 {
    let lower = content.to_lowercase();
    let mut score = IMPORTANCE_BASE;

    for cue in ["important", "critical", "urgent", "always", "never"] {
        if lower.contains(cue) {
            score += 0.2;
            break;
        }
    }
    for cue in ["remember", "must", "key "] {
        if lower.contains(cue) {
            score += 0.1;
            break;
        }
    }
    for cue in ["trivial", "minor", "maybe", "not sure"] {
        if lower.contains(cue) {
            score -= 0.2;
            break;
        }
    }

    score.clamp(0.0, 1.0)
}

/// One remembered fact or event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl MemoryRecord {
    /// Create a new record with heuristic defaults derived from the content
    pub fn new(content: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            memory_type: MemoryType::infer(&content),
            importance: infer_importance(&content),
            content,
            embedding: None,
            tenant_id: tenant_id.into(),
            agent_id: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl_secs: None,
        }
    }

    /// Whether the record's own TTL has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_secs {
            Some(ttl) => now >= self.created_at + chrono::Duration::seconds(ttl as i64),
            None => false,
        }
    }

    /// Refresh the access timestamp and bump the access counter
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }
}

/// Caller-supplied overrides for a remember call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// A recall request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    pub text: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_filter: Option<MemoryType>,
    pub limit: usize,
    pub threshold: f32,
    #[serde(default)]
    pub include_context: bool,
    #[serde(default)]
    pub time_decay: bool,
}

impl MemoryQuery {
    /// Create a query with default limit and threshold
    pub fn new(text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant_id: tenant_id.into(),
            agent_id: None,
            type_filter: None,
            limit: RECALL_LIMIT_DEFAULT,
            threshold: RECALL_THRESHOLD_DEFAULT,
            include_context: false,
            time_decay: false,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.type_filter = Some(memory_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_time_decay(mut self, time_decay: bool) -> Self {
        self.time_decay = time_decay;
        self
    }
}

/// One ranked recall result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResult {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Recent-memory summary for a tenant/agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    pub summary: String,
    pub memories: Vec<MemoryRecord>,
}

/// Request for a context summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default = "ContextRequest::default_limit")]
    pub limit: usize,
}

impl ContextRequest {
    fn default_limit() -> usize {
        20
    }

    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            agent_id: None,
            limit: Self::default_limit(),
        }
    }
}

/// Kind of engine operation, used for metrics and error wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Remember,
    Recall,
    Context,
    Forget,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Recall => "recall",
            Self::Context => "context",
            Self::Forget => "forget",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Telemetry for one completed operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub operation: Operation,
    pub duration_ms: u64,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}
