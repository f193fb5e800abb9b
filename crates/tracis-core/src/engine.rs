//! # Engine Module
//!
//! The application-facing surface: a storage backend plus the commit and
//! query operations layered on it.
//!
//! ## Storage Backends
//!
//! The engine supports two backends:
//! - `InMemory`: BTreeMap-backed `MemoryStore` (fast, volatile)
//! - `Persistent`: `RedbStore` for disk-backed ACID storage
//!
//! The graph model and reachability calculator are pure views built fresh
//! per query from the version's live entity set; the engine never caches
//! them across commits.

use crate::commit::{ChangeSet, CommitOptions, CommitOutcome, CommitPipeline};
use crate::export::CanonicalSnapshot;
use crate::graph::TraceGraph;
use crate::matrix::TraceMatrix;
use crate::notify::ChangeNotifier;
use crate::primitives::MAX_NEIGHBORHOOD_TYPES;
use crate::reach::{ReachabilityCalculator, ReachabilitySet};
use crate::store::{MemoryStore, StoreCounts, VersionStore, redb_store::RedbStore};
use crate::types::{
    Actor, Artifact, ArtifactId, ProjectId, TraceLink, TracisError, TypeName, VersionId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for an Engine.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

// =============================================================================
// ENGINE
// =============================================================================

/// An Engine combines a version store with the commit pipeline and the
/// structural query surface.
#[derive(Default)]
pub struct Engine {
    /// The storage backend (in-memory or persistent).
    backend: StorageBackend,
    /// Receives one change description per successful commit.
    notifier: Option<Box<dyn ChangeNotifier>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend)
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create a new engine with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine over an existing in-memory store.
    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            backend: StorageBackend::InMemory(store),
            notifier: None,
        }
    }

    /// Create an engine with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TracisError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
            notifier: None,
        })
    }

    /// Create an engine over an existing redb store.
    #[must_use]
    pub fn with_redb_store(store: RedbStore) -> Self {
        Self {
            backend: StorageBackend::Persistent(store),
            notifier: None,
        }
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Install the change notifier invoked after each successful commit.
    pub fn set_notifier(&mut self, notifier: Box<dyn ChangeNotifier>) {
        self.notifier = Some(notifier);
    }

    fn store(&self) -> &dyn VersionStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Commit a change set against a version target.
    ///
    /// On success the change description is handed to the installed
    /// notifier exactly once; an aborted commit notifies nothing.
    pub fn commit(
        &mut self,
        version: VersionId,
        change_set: ChangeSet,
        actor: &Actor,
        options: CommitOptions,
    ) -> Result<CommitOutcome, TracisError> {
        let outcome = match &mut self.backend {
            StorageBackend::InMemory(store) => {
                CommitPipeline::commit(store, version, change_set, actor, options)
            }
            StorageBackend::Persistent(store) => {
                CommitPipeline::commit(store, version, change_set, actor, options)
            }
        }?;

        if let Some(notifier) = &self.notifier {
            notifier.notify(&outcome.change);
        }
        Ok(outcome)
    }

    // =========================================================================
    // STRUCTURAL QUERIES
    // =========================================================================

    /// Build the trace graph of a version's live entity set.
    ///
    /// One node per live artifact; one edge per visible, non-declined link.
    pub fn graph_at(&self, version: VersionId) -> Result<TraceGraph, TracisError> {
        let store = self.store();
        let artifacts: Vec<Artifact> = store
            .live_artifacts(version)?
            .into_iter()
            .map(|(artifact, _)| artifact)
            .collect();
        let links: Vec<TraceLink> = store
            .live_links(version)?
            .into_iter()
            .filter(|(_, state)| state.is_edge())
            .map(|(link, _)| link)
            .collect();
        Ok(TraceGraph::build(&artifacts, &links))
    }

    /// The reachability view of one artifact at a version.
    ///
    /// Returns `Ok(None)` when the artifact is not live at that version.
    pub fn reachability(
        &self,
        version: VersionId,
        artifact: ArtifactId,
    ) -> Result<Option<ReachabilitySet>, TracisError> {
        let graph = self.graph_at(version)?;
        Ok(ReachabilityCalculator::new(&graph).reachability(artifact))
    }

    /// Reachability for every live artifact, reusing one graph build.
    pub fn reachability_all(
        &self,
        version: VersionId,
    ) -> Result<BTreeMap<ArtifactId, ReachabilitySet>, TracisError> {
        let graph = self.graph_at(version)?;
        let calc = ReachabilityCalculator::new(&graph);
        let mut result = BTreeMap::new();
        for node in graph.nodes() {
            if let Some(set) = calc.reachability(node.artifact) {
                result.insert(node.artifact, set);
            }
        }
        Ok(result)
    }

    /// Type-filtered neighborhood of one artifact at a version.
    pub fn neighborhood_with_types(
        &self,
        version: VersionId,
        artifact: ArtifactId,
        types: &[String],
    ) -> Result<Option<BTreeSet<ArtifactId>>, TracisError> {
        if types.len() > MAX_NEIGHBORHOOD_TYPES {
            return Err(TracisError::Validation(format!(
                "neighborhood query exceeds {} types",
                MAX_NEIGHBORHOOD_TYPES
            )));
        }
        let allowed: BTreeSet<TypeName> = types.iter().map(TypeName::new).collect();
        let graph = self.graph_at(version)?;
        Ok(ReachabilityCalculator::new(&graph).neighborhood_with_types(artifact, &allowed))
    }

    /// The effective trace matrix at a version.
    pub fn trace_matrix(&self, version: VersionId) -> Result<TraceMatrix, TracisError> {
        self.store().matrix_effective(version)
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Find a base artifact by project and name.
    pub fn artifact_by_name(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Artifact>, TracisError> {
        self.store().find_artifact(project, name)
    }

    /// Lookup a base artifact by id.
    pub fn artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, TracisError> {
        self.store().artifact(id)
    }

    /// Store-wide entity counts.
    pub fn counts(&self) -> Result<StoreCounts, TracisError> {
        self.store().counts()
    }

    // =========================================================================
    // EXPORT
    // =========================================================================

    /// Build the canonical snapshot of one version's live state.
    pub fn export_snapshot(&self, version: VersionId) -> Result<CanonicalSnapshot, TracisError> {
        let store = self.store();
        let artifacts = store.live_artifacts(version)?;
        let links = store.live_links(version)?;
        Ok(CanonicalSnapshot::from_live(version, &artifacts, &links))
    }
}

// =============================================================================
// TESTS
// =============================================================================
