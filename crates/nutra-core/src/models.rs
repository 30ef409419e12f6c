//! Core domain models shared across all nutra crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// SUPPLEMENT ENTITY
// =============================================================================

/// A supplement entity as read from the store.
///
/// The embedding vector itself stays in the database; read models omit
/// it so cache payloads stay small.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplementEntity {
    pub id: Uuid,
    /// Display name with original casing ("Lion's Mane").
    pub canonical_name: String,
    /// Normalized dedup key derived from the canonical name.
    pub canonical_key: String,
    pub scientific_name: Option<String>,
    pub aliases: Vec<String>,
    /// Model that produced the stored embedding.
    pub embedding_model: String,
    pub metadata: EntityMetadata,
    pub search_count: i64,
    pub last_searched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for inserting a new supplement entity.
#[derive(Debug, Clone)]
pub struct NewSupplement {
    pub canonical_name: String,
    pub scientific_name: Option<String>,
    pub aliases: Vec<String>,
    pub embedding: Vector,
    pub embedding_model: String,
    pub metadata: EntityMetadata,
    /// Seed for `search_count`; discovery seeds it from the queue item's
    /// occurrence count so demand observed before insertion is not lost.
    pub initial_search_count: i64,
}

/// Versioned entity metadata stored as JSONB.
///
/// Unknown fields round-trip through `extra` so rows written by newer
/// code survive reads by older code unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    /// Metadata schema version; bump on breaking field changes.
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_grade: Option<EvidenceGrade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_count: Option<i64>,
    /// Normalized query that triggered auto-discovery of this entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_query: Option<String>,
    /// Provenance marker ("auto-discovery" for pipeline inserts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_via: Option<String>,
    /// Fields this version does not model, preserved verbatim.
    ///
    /// Spelled `serde_json::Value` (not an alias): utoipa's derive keys value
    /// detection off the last path segment, and an alias would emit a `Ref` to
    /// a nonexistent schema.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for EntityMetadata {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            category: None,
            popularity: None,
            evidence_grade: None,
            study_count: None,
            source_query: None,
            discovered_via: None,
            extra: serde_json::Map::new(),
        }
    }
}

fn default_schema_version() -> i32 {
    1
}

/// Evidence grade derived from the published study count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceGrade {
    A,
    B,
    C,
    D,
}

impl EvidenceGrade {
    /// Grade a supplement by how many studies mention it.
    pub fn from_study_count(count: i64) -> Self {
        if count >= crate::defaults::EVIDENCE_GRADE_A_STUDIES {
            Self::A
        } else if count >= crate::defaults::EVIDENCE_GRADE_B_STUDIES {
            Self::B
        } else if count >= crate::defaults::EVIDENCE_GRADE_C_STUDIES {
            Self::C
        } else {
            Self::D
        }
    }
}

impl std::fmt::Display for EvidenceGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for EvidenceGrade {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(format!("Invalid evidence grade: {}", s)),
        }
    }
}

/// A search match: entity plus its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScoredSupplement {
    pub entity: SupplementEntity,
    pub similarity: f32,
}

// =============================================================================
// CACHE TYPES
// =============================================================================

/// Which tier served a lookup (or `Miss` when none did).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Tier1,
    Tier2,
    Tier3,
    Miss,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier1 => write!(f, "tier1"),
            Self::Tier2 => write!(f, "tier2"),
            Self::Tier3 => write!(f, "tier3"),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// A cached lookup verdict for one normalized query.
///
/// `NotFound` is the negative marker: the store was searched and had
/// nothing, so repeat queries skip the expensive tier for a short TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedLookup {
    Hit(ScoredSupplement),
    NotFound,
}

// =============================================================================
// DISCOVERY QUEUE
// =============================================================================

/// Lifecycle status of a discovery queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStatus {
    Pending,
    Processing,
    Validated,
    Rejected,
    Failed,
}

impl DiscoveryStatus {
    /// Whether this status can still transition (pending/processing).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Validated => write!(f, "validated"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DiscoveryStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "validated" => Ok(Self::Validated),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid discovery status: {}", s)),
        }
    }
}

/// A discovery queue row.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryItem {
    pub id: Uuid,
    /// First raw spelling seen for this key; becomes the display name.
    pub raw_query: String,
    pub normalized_query: String,
    pub occurrence_count: i64,
    /// Numeric claim-ordering priority (occurrence count, clamped).
    pub priority: i32,
    pub status: DiscoveryStatus,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may run (retry backoff).
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_token: Option<Uuid>,
    /// Occurrence count at the moment of terminal resolution; drives the
    /// re-enqueue threshold for rejected/failed items.
    pub resolved_occurrence: Option<i64>,
    pub entity_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryItem {
    /// Wire-facing priority bucket for this item.
    pub fn priority_level(&self) -> PriorityLevel {
        PriorityLevel::from_occurrences(self.occurrence_count)
    }
}

/// Coarse priority bucket derived from occurrence counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    High,
    Medium,
    Low,
}

impl PriorityLevel {
    pub fn from_occurrences(count: i64) -> Self {
        if count >= crate::defaults::PRIORITY_HIGH_OCCURRENCE {
            Self::High
        } else if count >= crate::defaults::PRIORITY_MEDIUM_OCCURRENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Wire shape describing a queued discovery.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEvent {
    pub normalized_query: String,
    pub occurrence_count: i64,
    pub priority: PriorityLevel,
    pub status: DiscoveryStatus,
    pub enqueued_at: DateTime<Utc>,
}

impl From<&DiscoveryItem> for DiscoveryEvent {
    fn from(item: &DiscoveryItem) -> Self {
        Self {
            normalized_query: item.normalized_query.clone(),
            occurrence_count: item.occurrence_count,
            priority: item.priority_level(),
            status: item.status,
            enqueued_at: item.enqueued_at,
        }
    }
}

/// Outcome of an enqueue upsert.
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub id: Uuid,
    pub normalized_query: String,
    /// Count after this enqueue was folded in.
    pub occurrence_count: i64,
    pub priority: PriorityLevel,
    pub status: DiscoveryStatus,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-status queue counts for the operational API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub validated: i64,
    pub rejected: i64,
    pub failed: i64,
    pub total: i64,
}

// =============================================================================
// API SHAPES
// =============================================================================

/// Entity summary attached to a search response.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub metadata: EntityMetadata,
    pub search_count: i64,
    pub similarity: f32,
}

impl From<&ScoredSupplement> for EntitySummary {
    fn from(scored: &ScoredSupplement) -> Self {
        Self {
            id: scored.entity.id,
            name: scored.entity.canonical_name.clone(),
            scientific_name: scored.entity.scientific_name.clone(),
            aliases: scored.entity.aliases.clone(),
            metadata: scored.entity.metadata.clone(),
            search_count: scored.entity.search_count,
            similarity: scored.similarity,
        }
    }
}

/// Response body for the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySummary>,
    /// Store-backed matches beyond the best one; absent on cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<EntitySummary>>,
    pub latency_ms: u64,
    pub cache_tier: CacheTier,
    /// Present on misses: whether a discovery was dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_queued: Option<bool>,
}
