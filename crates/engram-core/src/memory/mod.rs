//! Memory Records
//!
//! The fundamental unit of storage plus its companion records: relationships,
//! sessions, domains, and categories. Input structs carry caller intent;
//! normalization (tag canonicalization, importance clamping) happens here so
//! every writer shares the same rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

/// Which kind of agent produced a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    ClaudeDesktop,
    ClaudeCode,
    Api,
    #[default]
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ClaudeDesktop => "claude-desktop",
            AgentType::ClaudeCode => "claude-code",
            AgentType::Api => "api",
            AgentType::Unknown => "unknown",
        }
    }

    /// Parse from string name, defaulting to `unknown`.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "claude-desktop" => AgentType::ClaudeDesktop,
            "claude-code" => AgentType::ClaudeCode,
            "api" => AgentType::Api,
            _ => AgentType::Unknown,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility scope of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    /// Visible only within the session that created it.
    #[default]
    Session,
    /// Visible to the creating session and any session opting into shared reads.
    Shared,
    /// Visible everywhere.
    Global,
}

impl AccessScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessScope::Session => "session",
            AccessScope::Shared => "shared",
            AccessScope::Global => "global",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "shared" => AccessScope::Shared,
            "global" => AccessScope::Global,
            _ => AccessScope::Session,
        }
    }
}

/// Typed relationship between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    References,
    Contradicts,
    Expands,
    Similar,
    Sequential,
    Causes,
    Enables,
}

impl RelationshipType {
    /// All valid types, in wire order.
    pub const ALL: &'static [RelationshipType] = &[
        RelationshipType::References,
        RelationshipType::Contradicts,
        RelationshipType::Expands,
        RelationshipType::Similar,
        RelationshipType::Sequential,
        RelationshipType::Causes,
        RelationshipType::Enables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::References => "references",
            RelationshipType::Contradicts => "contradicts",
            RelationshipType::Expands => "expands",
            RelationshipType::Similar => "similar",
            RelationshipType::Sequential => "sequential",
            RelationshipType::Causes => "causes",
            RelationshipType::Enables => "enables",
        }
    }

    /// Parse from string name. Returns `None` for unknown types; callers
    /// reject those as bad requests rather than guessing.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "references" => Some(RelationshipType::References),
            "contradicts" => Some(RelationshipType::Contradicts),
            "expands" => Some(RelationshipType::Expands),
            "similar" => Some(RelationshipType::Similar),
            "sequential" => Some(RelationshipType::Sequential),
            "causes" => Some(RelationshipType::Causes),
            "enables" => Some(RelationshipType::Enables),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// A stored memory
///
/// Root memories have `chunk_level == 0`. Large content additionally produces
/// leaf chunks (`chunk_level == 1`) pointing back at the root through
/// `parent_memory_id`; chunks inherit the root's metadata at creation and are
/// not independently editable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier (UUID v4, canonical hyphenated form)
    pub id: String,
    /// The stored text
    pub content: String,
    /// Importance in 1..=10
    pub importance: i32,
    /// Canonical tag set: lowercase, trimmed, deduplicated, first-seen order
    pub tags: Vec<String>,
    /// Optional organizational domain (stored lowercase)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Optional provenance label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Owning session identifier
    pub session_id: String,
    /// Agent kind that created the memory
    pub agent_type: AgentType,
    /// Free-form agent context string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_context: Option<String>,
    /// Visibility scope
    pub access_scope: AccessScope,
    /// Root memory this chunk belongs to (chunks only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_memory_id: Option<String>,
    /// 0 for roots, 1 for leaf chunks
    pub chunk_level: i32,
    /// Position within the parent (chunks only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i32>,
    /// Optional human-readable unique slug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether an embedding has been pushed to the vector index
    pub has_embedding: bool,
}

/// A typed weighted directed edge between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    /// Edge weight in 0.0..=1.0
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An origin context, created lazily on first write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub agent_type: AgentType,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// An organizational domain (auto-created, lowercased)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An explicit organizational category
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for storing a new memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreMemoryInput {
    /// The content to remember (required, non-empty after trimming)
    pub content: String,
    /// Importance 1..=10; values at or below 0 fall back to the default of 5
    pub importance: Option<i64>,
    pub tags: Vec<String>,
    pub domain: Option<String>,
    pub source: Option<String>,
    /// Explicit session identifier (otherwise detected)
    pub session_id: Option<String>,
    /// Explicit agent type (otherwise detected)
    pub agent_type: Option<String>,
    pub agent_context: Option<String>,
    pub access_scope: Option<String>,
    pub slug: Option<String>,
}

/// Result of a store operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMemoryResult {
    pub memory: Memory,
    pub is_new: bool,
    pub session_id: String,
}

/// Partial update; absent fields keep their stored values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateMemoryInput {
    pub content: Option<String>,
    pub importance: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub domain: Option<String>,
    pub source: Option<String>,
}

impl UpdateMemoryInput {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.importance.is_none()
            && self.tags.is_none()
            && self.domain.is_none()
            && self.source.is_none()
    }
}

/// Session visibility mode for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFilterMode {
    #[default]
    All,
    SessionOnly,
    SessionAndShared,
}

/// Listing filters; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryListFilter {
    pub session_id: Option<String>,
    pub session_mode: SessionFilterMode,
    pub domain: Option<String>,
    /// Conjunctive tag filter: every listed tag must be present
    pub tags: Vec<String>,
    pub min_importance: Option<i32>,
    pub max_importance: Option<i32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Restrict to chunk children of this root memory
    pub parent_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_memories: u64,
    pub total_sessions: u64,
    pub total_domains: u64,
    pub total_categories: u64,
    pub current_session_id: String,
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Default importance when unset or non-positive.
pub const DEFAULT_IMPORTANCE: i32 = 5;

/// Clamp importance to 1..=10. Unset and non-positive values take the
/// default; values above 10 are capped.
pub fn clamp_importance(importance: Option<i64>) -> i32 {
    match importance {
        None => DEFAULT_IMPORTANCE,
        Some(v) if v <= 0 => DEFAULT_IMPORTANCE,
        Some(v) => v.min(10) as i32,
    }
}

/// Canonicalize a tag list: trim, lowercase, drop empties, deduplicate
/// preserving first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let normalized = tag.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

/// Clamp a relationship strength to 0.0..=1.0, defaulting to 0.5 for
/// non-finite input.
pub fn clamp_strength(strength: Option<f64>) -> f64 {
    match strength {
        None => 0.5,
        Some(v) if !v.is_finite() => 0.5,
        Some(v) => v.clamp(0.0, 1.0),
    }
}

// ============================================================================
// TESTS
// ============================================================================
