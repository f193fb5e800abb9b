//! # Version Store Port
//!
//! Abstract read/write access to base entities and version records.
//!
//! The commit pipeline owns all writes and stages them into a `CommitTxn`,
//! which a store applies as a single atomic unit of work: all writes land
//! together or none do. Stores key version records by (entity, version),
//! so at-most-one record per pair holds by construction.
//!
//! Two backends, selected by the engine:
//! - `MemoryStore` (this module): BTreeMap-backed, volatile
//! - `RedbStore` (`redb_store`): disk-backed ACID storage

pub mod redb_store;

use crate::matrix::TraceMatrix;
use crate::types::{
    Artifact, ArtifactContent, ArtifactId, ArtifactRecord, ModificationType, ProjectId,
    TraceLink, TraceLinkId, TraceRecord, TraceState, TracisError, VersionId,
};
use std::collections::BTreeMap;

// =============================================================================
// COMMIT TRANSACTION
// =============================================================================

/// The staged writes of one commit.
///
/// Built entirely before any store mutation; `VersionStore::apply` persists
/// it atomically. Version records upsert: re-applying the same (entity,
/// version) pair replaces the record rather than duplicating it.
#[derive(Debug, Clone, Default)]
pub struct CommitTxn {
    /// The version every staged record targets.
    pub version: VersionId,
    /// Base entities created by this commit.
    pub new_artifacts: Vec<Artifact>,
    /// Trace links created by this commit.
    pub new_links: Vec<TraceLink>,
    /// Artifact version records to upsert.
    pub artifact_records: Vec<ArtifactRecord>,
    /// Trace version records to upsert.
    pub trace_records: Vec<TraceRecord>,
    /// Full replacement matrix for `version`, when any link transitioned.
    pub matrix: Option<TraceMatrix>,
}

impl CommitTxn {
    /// Create an empty transaction targeting one version.
    #[must_use]
    pub fn new(version: VersionId) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// True when the transaction stages no writes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_artifacts.is_empty()
            && self.new_links.is_empty()
            && self.artifact_records.is_empty()
            && self.trace_records.is_empty()
            && self.matrix.is_none()
    }
}

// =============================================================================
// LOOKUP MODE
// =============================================================================

/// Which record a batched version-record read resolves per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLookup {
    /// The effective record at the version: latest record with
    /// `record.version <= version`. Used for conflict checks and as the
    /// previous state of matrix transitions.
    AtOrBefore,
    /// The latest record from a STRICTLY earlier version. Used to classify
    /// Added vs Modified, so re-committing the same version stays
    /// idempotent.
    Before,
}

/// Store-wide entity counts, for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub artifacts: usize,
    pub links: usize,
    pub artifact_records: usize,
    pub trace_records: usize,
}

// =============================================================================
// VERSION STORE TRAIT
// =============================================================================

/// The storage port the engine and commit pipeline operate against.
///
/// All fallible operations return `Result<T, TracisError>` so in-memory
/// and persistent backends behave uniformly.
pub trait VersionStore {
    /// Find a base artifact by project and (exact) name.
    fn find_artifact(&self, project: ProjectId, name: &str)
    -> Result<Option<Artifact>, TracisError>;

    /// Lookup a base artifact by id.
    fn artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, TracisError>;

    /// Find a base trace link by project and endpoint pair.
    fn find_link(
        &self,
        project: ProjectId,
        source: ArtifactId,
        target: ArtifactId,
    ) -> Result<Option<TraceLink>, TracisError>;

    /// Allocate the next artifact id. Ids allocated for an aborted commit
    /// are simply never persisted; gaps are harmless.
    fn allocate_artifact_id(&mut self) -> ArtifactId;

    /// Allocate the next trace link id.
    fn allocate_link_id(&mut self) -> TraceLinkId;

    /// Batched version-record read for the touched artifacts.
    fn artifact_records(
        &self,
        version: VersionId,
        ids: &[ArtifactId],
        lookup: RecordLookup,
    ) -> Result<BTreeMap<ArtifactId, ArtifactRecord>, TracisError>;

    /// Batched version-record read for the touched trace links.
    fn trace_records(
        &self,
        version: VersionId,
        ids: &[TraceLinkId],
        lookup: RecordLookup,
    ) -> Result<BTreeMap<TraceLinkId, TraceRecord>, TracisError>;

    /// Every artifact live (effective record not a tombstone) at a version.
    fn live_artifacts(
        &self,
        version: VersionId,
    ) -> Result<Vec<(Artifact, ArtifactContent)>, TracisError>;

    /// Every trace link live at a version, with its effective state.
    fn live_links(&self, version: VersionId)
    -> Result<Vec<(TraceLink, TraceState)>, TracisError>;

    /// The effective trace matrix at a version: the matrix materialized at
    /// the nearest version `<=` the target, or empty if none exists yet.
    fn matrix_effective(&self, version: VersionId) -> Result<TraceMatrix, TracisError>;

    /// Apply a commit transaction atomically.
    fn apply(&mut self, txn: CommitTxn) -> Result<(), TracisError>;

    /// Store-wide counts.
    fn counts(&self) -> Result<StoreCounts, TracisError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// BTreeMap-backed store. Fast, volatile, deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: BTreeMap<ArtifactId, Artifact>,
    artifact_index: BTreeMap<(ProjectId, String), ArtifactId>,
    links: BTreeMap<TraceLinkId, TraceLink>,
    link_index: BTreeMap<(ProjectId, ArtifactId, ArtifactId), TraceLinkId>,
    artifact_records: BTreeMap<(ArtifactId, VersionId), ArtifactRecord>,
    trace_records: BTreeMap<(TraceLinkId, VersionId), TraceRecord>,
    matrices: BTreeMap<VersionId, TraceMatrix>,
    next_artifact_id: u64,
    next_link_id: u64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_artifact_record(
        &self,
        id: ArtifactId,
        version: VersionId,
        lookup: RecordLookup,
    ) -> Option<&ArtifactRecord> {
        let range = match lookup {
            RecordLookup::AtOrBefore => self
                .artifact_records
                .range((id, VersionId(0))..=(id, version)),
            RecordLookup::Before => self.artifact_records.range((id, VersionId(0))..(id, version)),
        };
        range.last().map(|(_, record)| record)
    }

    fn effective_trace_record(
        &self,
        id: TraceLinkId,
        version: VersionId,
        lookup: RecordLookup,
    ) -> Option<&TraceRecord> {
        let range = match lookup {
            RecordLookup::AtOrBefore => {
                self.trace_records.range((id, VersionId(0))..=(id, version))
            }
            RecordLookup::Before => self.trace_records.range((id, VersionId(0))..(id, version)),
        };
        range.last().map(|(_, record)| record)
    }
}

impl VersionStore for MemoryStore {
    fn find_artifact(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Artifact>, TracisError> {
        Ok(self
            .artifact_index
            .get(&(project, name.to_string()))
            .and_then(|id| self.artifacts.get(id))
            .cloned())
    }

    fn artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, TracisError> {
        Ok(self.artifacts.get(&id).cloned())
    }

    fn find_link(
        &self,
        project: ProjectId,
        source: ArtifactId,
        target: ArtifactId,
    ) -> Result<Option<TraceLink>, TracisError> {
        Ok(self
            .link_index
            .get(&(project, source, target))
            .and_then(|id| self.links.get(id))
            .cloned())
    }

    fn allocate_artifact_id(&mut self) -> ArtifactId {
        let id = ArtifactId(self.next_artifact_id);
        self.next_artifact_id = self.next_artifact_id.saturating_add(1);
        id
    }

    fn allocate_link_id(&mut self) -> TraceLinkId {
        let id = TraceLinkId(self.next_link_id);
        self.next_link_id = self.next_link_id.saturating_add(1);
        id
    }

    fn artifact_records(
        &self,
        version: VersionId,
        ids: &[ArtifactId],
        lookup: RecordLookup,
    ) -> Result<BTreeMap<ArtifactId, ArtifactRecord>, TracisError> {
        let mut result = BTreeMap::new();
        for &id in ids {
            if let Some(record) = self.effective_artifact_record(id, version, lookup) {
                result.insert(id, record.clone());
            }
        }
        Ok(result)
    }

    fn trace_records(
        &self,
        version: VersionId,
        ids: &[TraceLinkId],
        lookup: RecordLookup,
    ) -> Result<BTreeMap<TraceLinkId, TraceRecord>, TracisError> {
        let mut result = BTreeMap::new();
        for &id in ids {
            if let Some(record) = self.effective_trace_record(id, version, lookup) {
                result.insert(id, record.clone());
            }
        }
        Ok(result)
    }

    fn live_artifacts(
        &self,
        version: VersionId,
    ) -> Result<Vec<(Artifact, ArtifactContent)>, TracisError> {
        // Records are keyed (id, version) so one ordered pass yields the
        // latest record <= version per artifact.
        let mut effective: BTreeMap<ArtifactId, &ArtifactRecord> = BTreeMap::new();
        for ((id, record_version), record) in &self.artifact_records {
            if *record_version <= version {
                effective.insert(*id, record);
            }
        }

        let mut result = Vec::new();
        for (id, record) in effective {
            if record.modification == ModificationType::Removed {
                continue;
            }
            if let Some(artifact) = self.artifacts.get(&id) {
                result.push((artifact.clone(), record.content.clone()));
            }
        }
        Ok(result)
    }

    fn live_links(
        &self,
        version: VersionId,
    ) -> Result<Vec<(TraceLink, TraceState)>, TracisError> {
        let mut effective: BTreeMap<TraceLinkId, &TraceRecord> = BTreeMap::new();
        for ((id, record_version), record) in &self.trace_records {
            if *record_version <= version {
                effective.insert(*id, record);
            }
        }

        let mut result = Vec::new();
        for (id, record) in effective {
            if record.modification == ModificationType::Removed
                || !record.state.approval.is_live()
            {
                continue;
            }
            if let Some(link) = self.links.get(&id) {
                result.push((link.clone(), record.state));
            }
        }
        Ok(result)
    }

    fn matrix_effective(&self, version: VersionId) -> Result<TraceMatrix, TracisError> {
        Ok(self
            .matrices
            .range(..=version)
            .next_back()
            .map(|(_, matrix)| matrix.clone())
            .unwrap_or_default())
    }

    fn apply(&mut self, txn: CommitTxn) -> Result<(), TracisError> {
        // Validate name/endpoint uniqueness for new base entities before
        // mutating anything - apply is all-or-nothing.
        for artifact in &txn.new_artifacts {
            let key = (artifact.project, artifact.name.clone());
            if let Some(existing) = self.artifact_index.get(&key)
                && *existing != artifact.id
            {
                return Err(TracisError::Storage(format!(
                    "duplicate artifact name '{}' in project {}",
                    artifact.name, artifact.project.0
                )));
            }
        }
        for link in &txn.new_links {
            let key = (link.project, link.source, link.target);
            if let Some(existing) = self.link_index.get(&key)
                && *existing != link.id
            {
                return Err(TracisError::Storage(format!(
                    "duplicate trace link {} -> {}",
                    link.source.0, link.target.0
                )));
            }
        }

        let version = txn.version;
        for artifact in txn.new_artifacts {
            self.artifact_index
                .insert((artifact.project, artifact.name.clone()), artifact.id);
            self.artifacts.insert(artifact.id, artifact);
        }
        for link in txn.new_links {
            self.link_index
                .insert((link.project, link.source, link.target), link.id);
            self.links.insert(link.id, link);
        }
        for record in txn.artifact_records {
            self.artifact_records
                .insert((record.artifact, record.version), record);
        }
        for record in txn.trace_records {
            self.trace_records.insert((record.link, record.version), record);
        }
        if let Some(matrix) = txn.matrix {
            self.matrices.insert(version, matrix);
        }
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts, TracisError> {
        Ok(StoreCounts {
            artifacts: self.artifacts.len(),
            links: self.links.len(),
            artifact_records: self.artifact_records.len(),
            trace_records: self.trace_records.len(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
