//! # Core Type Definitions
//!
//! This module contains all core types for the Tracis versioned trace engine:
//! - Entity identifiers (`ProjectId`, `ArtifactId`, `TraceLinkId`, `VersionId`)
//! - Base entities (`Artifact`, `TraceLink`) and their per-version payloads
//!   (`ArtifactContent`, `TraceState`)
//! - Version records (`ArtifactRecord`, `TraceRecord`)
//! - Error types (`TracisError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (confidence is stored in thousandths)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for counters to prevent overflow

use crate::primitives::CONFIDENCE_SCALE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a project.
///
/// Artifacts and trace links always belong to exactly one project;
/// links may not cross project boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub u64);

/// Unique identifier for the version-independent identity of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub u64);

/// Unique identifier for the version-independent identity of a trace link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceLinkId(pub u64);

/// A position in a project's append-only version history.
///
/// Commits and queries operate against one version target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct VersionId(pub u64);

// =============================================================================
// TYPE NAME
// =============================================================================

/// An artifact type name.
///
/// Type names are case-insensitive; construction normalizes to lowercase
/// so `"Requirement"` and `"requirement"` compare equal everywhere
/// (trace-matrix keys, neighborhood filters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name, normalizing to canonical lowercase form.
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_lowercase())
    }

    /// Get the canonical (lowercased) form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the normalized name is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// CONFIDENCE
// =============================================================================

/// Confidence score of a trace link, in integer thousandths.
///
/// `0` = no confidence, `1000` = full certainty. Construction clamps to the
/// valid range, so every `Confidence` in the system is well-formed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Confidence(u16);

impl Confidence {
    /// No confidence.
    pub const ZERO: Self = Self(0);

    /// Full certainty; the score assigned to manual links.
    pub const CERTAIN: Self = Self(CONFIDENCE_SCALE);

    /// Create a confidence score from thousandths, clamping to 0..=1000.
    #[must_use]
    pub const fn from_thousandths(value: u16) -> Self {
        if value > CONFIDENCE_SCALE {
            Self(CONFIDENCE_SCALE)
        } else {
            Self(value)
        }
    }

    /// Get the raw thousandths value.
    #[must_use]
    pub const fn thousandths(self) -> u16 {
        self.0
    }
}

// =============================================================================
// TRACE LINK STATE COMPONENTS
// =============================================================================

/// How a trace link came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraceKind {
    /// Asserted by a person.
    Manual,
    /// Produced by an automated recovery technique.
    Generated,
}

/// Review state of a trace link.
///
/// `Declined` is the dead state: a declined link contributes to no
/// aggregate and no graph edge. Removal tombstones force this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApprovalState {
    /// Confirmed correct.
    Approved,
    /// Awaiting review.
    Proposed,
    /// Rejected, or removed via tombstone.
    Declined,
}

impl ApprovalState {
    /// A link is live unless it has been declined.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Declined)
    }
}

/// Tag on a version record describing the change relative to the prior
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModificationType {
    Added,
    Modified,
    Removed,
}

// =============================================================================
// ACTOR
// =============================================================================

/// The author of a commit, stamped onto every version record it produces.
///
/// Passed explicitly into `commit` - the engine holds no ambient
/// "current user" state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// Create an actor from a display name or account id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the actor as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// A typed custom field value on an artifact version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

/// The version-independent identity of an artifact.
///
/// Created once by the commit pipeline; per-version content lives in
/// `ArtifactRecord`s and is never mutated outside a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque identity.
    pub id: ArtifactId,
    /// Owning project.
    pub project: ProjectId,
    /// Normalized type name.
    pub type_name: TypeName,
    /// Name, unique within the owning project.
    pub name: String,
}

/// Per-version content of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArtifactContent {
    /// One-line summary.
    pub summary: String,
    /// Body text.
    pub body: String,
    /// Typed custom fields, deterministically ordered.
    pub fields: BTreeMap<String, FieldValue>,
}

// =============================================================================
// TRACE LINKS
// =============================================================================

/// The version-independent identity of a directed trace link.
///
/// Invariant: `source` and `target` belong to `project`. The commit
/// pipeline rejects cross-project links before a link is ever created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLink {
    /// Opaque identity.
    pub id: TraceLinkId,
    /// Owning project.
    pub project: ProjectId,
    /// Trace source artifact.
    pub source: ArtifactId,
    /// Trace target artifact.
    pub target: ArtifactId,
}

/// Per-version state of a trace link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceState {
    /// Manual or generated.
    pub kind: TraceKind,
    /// Score in thousandths.
    pub confidence: Confidence,
    /// Review state.
    pub approval: ApprovalState,
    /// Visibility flag; invisible links contribute no graph edges.
    pub visible: bool,
}

impl TraceState {
    /// The state written into removal tombstones: declined and invisible,
    /// so downstream aggregation treats removed links uniformly with
    /// never-approved ones. Kind and confidence carry over from `previous`
    /// because removal decrements counters using the previous record.
    #[must_use]
    pub const fn tombstone(previous: Self) -> Self {
        Self {
            kind: previous.kind,
            confidence: previous.confidence,
            approval: ApprovalState::Declined,
            visible: false,
        }
    }

    /// A link contributes a graph edge only when visible and not declined.
    #[must_use]
    pub const fn is_edge(self) -> bool {
        self.visible && self.approval.is_live()
    }
}

// =============================================================================
// VERSION RECORDS
// =============================================================================

/// The materialized state of one artifact as of one version.
///
/// Exactly one record exists per (artifact, version) pair; stores key
/// records by that pair so the invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact: ArtifactId,
    pub version: VersionId,
    pub modification: ModificationType,
    pub author: Actor,
    pub content: ArtifactContent,
}

/// The materialized state of one trace link as of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub link: TraceLinkId,
    pub version: VersionId,
    pub modification: ModificationType,
    pub author: Actor,
    pub state: TraceState,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Tracis engine.
///
/// - No silent failures
/// - Use `Result<T, TracisError>` for fallible operations
/// - The engine should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum TracisError {
    /// Malformed input: cross-project link, empty or oversized names.
    /// Always surfaced, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested state transition contradicts durable state, e.g. a
    /// generated link submitted over an approved manual one.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced entity does not exist at the version target.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying store failure. Fatal to the whole commit: partial
    /// persistence would violate the one-record-per-(entity, version)
    /// invariant.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_normalizes_case() {
        assert_eq!(TypeName::new("Requirement"), TypeName::new("REQUIREMENT"));
        assert_eq!(TypeName::new(" Design "), TypeName::new("design"));
        assert_eq!(TypeName::new("Test Case").as_str(), "test case");
    }

    #[test]
    fn confidence_clamps_to_scale() {
        assert_eq!(Confidence::from_thousandths(5000), Confidence::CERTAIN);
        assert_eq!(Confidence::from_thousandths(800).thousandths(), 800);
        assert_eq!(Confidence::ZERO.thousandths(), 0);
    }

    #[test]
    fn declined_is_not_live() {
        assert!(ApprovalState::Approved.is_live());
        assert!(ApprovalState::Proposed.is_live());
        assert!(!ApprovalState::Declined.is_live());
    }

    #[test]
    fn tombstone_keeps_kind_and_confidence() {
        let state = TraceState {
            kind: TraceKind::Generated,
            confidence: Confidence::from_thousandths(800),
            approval: ApprovalState::Approved,
            visible: true,
        };

        let tomb = TraceState::tombstone(state);
        assert_eq!(tomb.kind, TraceKind::Generated);
        assert_eq!(tomb.confidence.thousandths(), 800);
        assert_eq!(tomb.approval, ApprovalState::Declined);
        assert!(!tomb.visible);
        assert!(!tomb.is_edge());
    }

    #[test]
    fn edge_requires_visible_and_live() {
        let mut state = TraceState {
            kind: TraceKind::Manual,
            confidence: Confidence::CERTAIN,
            approval: ApprovalState::Approved,
            visible: true,
        };
        assert!(state.is_edge());

        state.visible = false;
        assert!(!state.is_edge());

        state.visible = true;
        state.approval = ApprovalState::Declined;
        assert!(!state.is_edge());
    }
}
