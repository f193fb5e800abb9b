//! # tracis-core
//!
//! The versioned trace commit engine for Tracis - THE ENGINE.
//!
//! This crate tracks a mutable, graph-shaped dataset (artifacts and
//! directed trace links) across an append-only sequence of versions, and
//! keeps derived aggregates exactly consistent with that history:
//! - the commit pipeline guarantees at-most-one version record per
//!   (entity, version) and applies each commit as one atomic unit of work
//! - the trace matrix is maintained incrementally per link transition,
//!   never by full recomputation
//! - reachability (ancestors, descendants, type-filtered neighborhoods)
//!   is computed on demand over a per-request graph build
//!
//! ## Architectural Constraints
//!
//! - Is the ONLY place where version records and matrix counters are
//!   written (all mutation flows through the commit pipeline)
//! - Has NO async, NO network dependencies (pure Rust)
//! - Is deterministic: BTree collections only, integer arithmetic only

// =============================================================================
// MODULES
// =============================================================================

pub mod commit;
pub mod engine;
pub mod export;
pub mod graph;
pub mod matrix;
pub mod notify;
pub mod primitives;
pub mod query;
pub mod reach;
pub mod registry;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Actor, ApprovalState, Artifact, ArtifactContent, ArtifactId, ArtifactRecord, Confidence,
    FieldValue, ModificationType, ProjectId, TraceKind, TraceLink, TraceLinkId, TraceRecord,
    TraceState, TracisError, TypeName, VersionId,
};

// =============================================================================
// RE-EXPORTS: Commit Pipeline
// =============================================================================

pub use commit::{
    Activity, ArtifactDraft, ChangeSet, CommitError, CommitErrorKind, CommitOptions,
    CommitOutcome, CommitPipeline, EntityChanges, TraceDraft,
};

// =============================================================================
// RE-EXPORTS: Engine & Storage
// =============================================================================

pub use engine::{Engine, StorageBackend};
pub use store::{CommitTxn, MemoryStore, RecordLookup, StoreCounts, VersionStore};
pub use store::redb_store::RedbStore;

// =============================================================================
// RE-EXPORTS: Aggregates & Queries
// =============================================================================

pub use graph::{TraceGraph, TraceNode};
pub use matrix::{MatrixChange, MatrixEntry, MatrixKey, TraceMatrix, Transition};
pub use notify::{
    ArtifactChange, ChangeDescription, ChangeNotifier, RecordingNotifier, TraceChange,
};
pub use query::{Query, QueryType};
pub use reach::{ReachabilityCalculator, ReachabilitySet};
pub use registry::Registry;

// =============================================================================
// RE-EXPORTS: Canonical Export
// =============================================================================

pub use export::{
    CanonicalHeader, CanonicalSnapshot, canonical_checksum, export_canonical, import_canonical,
    verify_canonical,
};
