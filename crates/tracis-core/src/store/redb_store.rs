//! # redb-backed Version Store
//!
//! A disk-backed `VersionStore` using the redb embedded database.
//!
//! redb provides the serialization primitive the commit pipeline relies on
//! instead of re-implementing it:
//! - ACID transactions (one write transaction per commit)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Version records are keyed by (entity id, version), so the
//! one-record-per-(entity, version) invariant is structural. Name and
//! endpoint indexes are mirrored in memory at open for fast resolution,
//! mirroring the on-disk index tables.

use super::{CommitTxn, RecordLookup, StoreCounts, VersionStore};
use crate::matrix::TraceMatrix;
use crate::types::{
    Artifact, ArtifactContent, ArtifactId, ArtifactRecord, ModificationType, ProjectId,
    TraceLink, TraceLinkId, TraceRecord, TraceState, TracisError, VersionId,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Table for base artifacts: ArtifactId(u64) -> serialized Artifact bytes.
const ARTIFACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("artifacts");

/// Table for the artifact name index: (project, name) -> ArtifactId.
const ARTIFACT_INDEX: TableDefinition<(u64, &str), u64> = TableDefinition::new("artifact_index");

/// Table for base trace links: TraceLinkId(u64) -> serialized TraceLink bytes.
const LINKS: TableDefinition<u64, &[u8]> = TableDefinition::new("links");

/// Table for the link endpoint index: (project, source, target) -> TraceLinkId.
const LINK_INDEX: TableDefinition<(u64, u64, u64), u64> = TableDefinition::new("link_index");

/// Table for artifact version records: (artifact, version) -> bytes.
const ARTIFACT_RECORDS: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("artifact_records");

/// Table for trace version records: (link, version) -> bytes.
const TRACE_RECORDS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("trace_records");

/// Table for materialized matrices: version -> serialized TraceMatrix bytes.
const MATRICES: TableDefinition<u64, &[u8]> = TableDefinition::new("matrices");

/// Table for metadata: key string -> value u64.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn storage_err(e: impl std::fmt::Display) -> TracisError {
    TracisError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TracisError> {
    postcard::to_allocvec(value).map_err(|e| TracisError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TracisError> {
    postcard::from_bytes(bytes).map_err(|e| TracisError::Serialization(e.to_string()))
}

/// A disk-backed version store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// In-memory mirror of ARTIFACT_INDEX for fast name resolution.
    artifact_index: BTreeMap<(ProjectId, String), ArtifactId>,
    /// In-memory mirror of LINK_INDEX.
    link_index: BTreeMap<(ProjectId, ArtifactId, ArtifactId), TraceLinkId>,
    /// Next available artifact id.
    next_artifact_id: u64,
    /// Next available trace link id.
    next_link_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("artifact_index_size", &self.artifact_index.len())
            .field("link_index_size", &self.link_index.len())
            .field("next_artifact_id", &self.next_artifact_id)
            .field("next_link_id", &self.next_link_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TracisError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(ARTIFACTS).map_err(storage_err)?;
            let _ = write_txn.open_table(ARTIFACT_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(LINKS).map_err(storage_err)?;
            let _ = write_txn.open_table(LINK_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(ARTIFACT_RECORDS).map_err(storage_err)?;
            let _ = write_txn.open_table(TRACE_RECORDS).map_err(storage_err)?;
            let _ = write_txn.open_table(MATRICES).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        let read_txn = db.begin_read().map_err(storage_err)?;

        let (next_artifact_id, next_link_id) = {
            let table = read_txn.open_table(METADATA).map_err(storage_err)?;
            let artifact = table
                .get("next_artifact_id")
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let link = table
                .get("next_link_id")
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            (artifact, link)
        };

        let artifact_index = {
            let table = read_txn.open_table(ARTIFACT_INDEX).map_err(storage_err)?;
            let mut index = BTreeMap::new();
            for entry in table.iter().map_err(storage_err)? {
                let (key, value) = entry.map_err(storage_err)?;
                let (project, name) = key.value();
                index.insert(
                    (ProjectId(project), name.to_string()),
                    ArtifactId(value.value()),
                );
            }
            index
        };

        let link_index = {
            let table = read_txn.open_table(LINK_INDEX).map_err(storage_err)?;
            let mut index = BTreeMap::new();
            for entry in table.iter().map_err(storage_err)? {
                let (key, value) = entry.map_err(storage_err)?;
                let (project, source, target) = key.value();
                index.insert(
                    (ProjectId(project), ArtifactId(source), ArtifactId(target)),
                    TraceLinkId(value.value()),
                );
            }
            index
        };

        Ok(Self {
            db,
            artifact_index,
            link_index,
            next_artifact_id,
            next_link_id,
        })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), TracisError> {
        self.db.compact().map_err(storage_err)?;
        Ok(())
    }
}

impl VersionStore for RedbStore {
    fn find_artifact(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Artifact>, TracisError> {
        match self.artifact_index.get(&(project, name.to_string())) {
            Some(&id) => self.artifact(id),
            None => Ok(None),
        }
    }

    fn artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, TracisError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ARTIFACTS).map_err(storage_err)?;
        table
            .get(id.0)
            .map_err(storage_err)?
            .map(|bytes| decode(bytes.value()))
            .transpose()
    }

    fn find_link(
        &self,
        project: ProjectId,
        source: ArtifactId,
        target: ArtifactId,
    ) -> Result<Option<TraceLink>, TracisError> {
        let Some(&id) = self.link_index.get(&(project, source, target)) else {
            return Ok(None);
        };
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(LINKS).map_err(storage_err)?;
        table
            .get(id.0)
            .map_err(storage_err)?
            .map(|bytes| decode(bytes.value()))
            .transpose()
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
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ARTIFACT_RECORDS).map_err(storage_err)?;

        let mut result = BTreeMap::new();
        for &id in ids {
            let mut range = match lookup {
                RecordLookup::AtOrBefore => table
                    .range((id.0, 0)..=(id.0, version.0))
                    .map_err(storage_err)?,
                RecordLookup::Before => table
                    .range((id.0, 0)..(id.0, version.0))
                    .map_err(storage_err)?,
            };
            if let Some(entry) = range.next_back() {
                let (_, bytes) = entry.map_err(storage_err)?;
                result.insert(id, decode::<ArtifactRecord>(bytes.value())?);
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
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TRACE_RECORDS).map_err(storage_err)?;

        let mut result = BTreeMap::new();
        for &id in ids {
            let mut range = match lookup {
                RecordLookup::AtOrBefore => table
                    .range((id.0, 0)..=(id.0, version.0))
                    .map_err(storage_err)?,
                RecordLookup::Before => table
                    .range((id.0, 0)..(id.0, version.0))
                    .map_err(storage_err)?,
            };
            if let Some(entry) = range.next_back() {
                let (_, bytes) = entry.map_err(storage_err)?;
                result.insert(id, decode::<TraceRecord>(bytes.value())?);
            }
        }
        Ok(result)
    }

    fn live_artifacts(
        &self,
        version: VersionId,
    ) -> Result<Vec<(Artifact, ArtifactContent)>, TracisError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let records = read_txn.open_table(ARTIFACT_RECORDS).map_err(storage_err)?;
        let artifacts = read_txn.open_table(ARTIFACTS).map_err(storage_err)?;

        // Keys are ordered (id, version): one pass keeps the latest
        // record <= version per artifact.
        let mut effective: BTreeMap<u64, ArtifactRecord> = BTreeMap::new();
        for entry in records.iter().map_err(storage_err)? {
            let (key, bytes) = entry.map_err(storage_err)?;
            let (id, record_version) = key.value();
            if record_version <= version.0 {
                effective.insert(id, decode(bytes.value())?);
            }
        }

        let mut result = Vec::new();
        for (id, record) in effective {
            if record.modification == ModificationType::Removed {
                continue;
            }
            if let Some(bytes) = artifacts.get(id).map_err(storage_err)? {
                result.push((decode::<Artifact>(bytes.value())?, record.content));
            }
        }
        Ok(result)
    }

    fn live_links(
        &self,
        version: VersionId,
    ) -> Result<Vec<(TraceLink, TraceState)>, TracisError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let records = read_txn.open_table(TRACE_RECORDS).map_err(storage_err)?;
        let links = read_txn.open_table(LINKS).map_err(storage_err)?;

        let mut effective: BTreeMap<u64, TraceRecord> = BTreeMap::new();
        for entry in records.iter().map_err(storage_err)? {
            let (key, bytes) = entry.map_err(storage_err)?;
            let (id, record_version) = key.value();
            if record_version <= version.0 {
                effective.insert(id, decode(bytes.value())?);
            }
        }

        let mut result = Vec::new();
        for (id, record) in effective {
            if record.modification == ModificationType::Removed
                || !record.state.approval.is_live()
            {
                continue;
            }
            if let Some(bytes) = links.get(id).map_err(storage_err)? {
                result.push((decode::<TraceLink>(bytes.value())?, record.state));
            }
        }
        Ok(result)
    }

    fn matrix_effective(&self, version: VersionId) -> Result<TraceMatrix, TracisError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(MATRICES).map_err(storage_err)?;
        let mut range = table.range(..=version.0).map_err(storage_err)?;
        match range.next_back() {
            Some(entry) => {
                let (_, bytes) = entry.map_err(storage_err)?;
                decode(bytes.value())
            }
            None => Ok(TraceMatrix::new()),
        }
    }

    fn apply(&mut self, txn: CommitTxn) -> Result<(), TracisError> {
        // Validate against the in-memory indexes before opening the write
        // transaction - apply is all-or-nothing.
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

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut artifacts = write_txn.open_table(ARTIFACTS).map_err(storage_err)?;
            let mut artifact_index = write_txn.open_table(ARTIFACT_INDEX).map_err(storage_err)?;
            let mut links = write_txn.open_table(LINKS).map_err(storage_err)?;
            let mut link_index = write_txn.open_table(LINK_INDEX).map_err(storage_err)?;
            let mut artifact_records =
                write_txn.open_table(ARTIFACT_RECORDS).map_err(storage_err)?;
            let mut trace_records = write_txn.open_table(TRACE_RECORDS).map_err(storage_err)?;
            let mut matrices = write_txn.open_table(MATRICES).map_err(storage_err)?;
            let mut metadata = write_txn.open_table(METADATA).map_err(storage_err)?;

            for artifact in &txn.new_artifacts {
                let bytes = encode(artifact)?;
                artifacts
                    .insert(artifact.id.0, bytes.as_slice())
                    .map_err(storage_err)?;
                artifact_index
                    .insert(
                        (artifact.project.0, artifact.name.as_str()),
                        artifact.id.0,
                    )
                    .map_err(storage_err)?;
            }
            for link in &txn.new_links {
                let bytes = encode(link)?;
                links.insert(link.id.0, bytes.as_slice()).map_err(storage_err)?;
                link_index
                    .insert((link.project.0, link.source.0, link.target.0), link.id.0)
                    .map_err(storage_err)?;
            }
            for record in &txn.artifact_records {
                let bytes = encode(record)?;
                artifact_records
                    .insert((record.artifact.0, record.version.0), bytes.as_slice())
                    .map_err(storage_err)?;
            }
            for record in &txn.trace_records {
                let bytes = encode(record)?;
                trace_records
                    .insert((record.link.0, record.version.0), bytes.as_slice())
                    .map_err(storage_err)?;
            }
            if let Some(matrix) = &txn.matrix {
                let bytes = encode(matrix)?;
                matrices
                    .insert(txn.version.0, bytes.as_slice())
                    .map_err(storage_err)?;
            }
            metadata
                .insert("next_artifact_id", self.next_artifact_id)
                .map_err(storage_err)?;
            metadata
                .insert("next_link_id", self.next_link_id)
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        // Mirror indexes only after the transaction is durable.
        for artifact in txn.new_artifacts {
            self.artifact_index
                .insert((artifact.project, artifact.name), artifact.id);
        }
        for link in txn.new_links {
            self.link_index
                .insert((link.project, link.source, link.target), link.id);
        }
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts, TracisError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let artifacts = read_txn.open_table(ARTIFACTS).map_err(storage_err)?;
        let links = read_txn.open_table(LINKS).map_err(storage_err)?;
        let artifact_records = read_txn.open_table(ARTIFACT_RECORDS).map_err(storage_err)?;
        let trace_records = read_txn.open_table(TRACE_RECORDS).map_err(storage_err)?;
        Ok(StoreCounts {
            artifacts: artifacts.len().map_err(storage_err)? as usize,
            links: links.len().map_err(storage_err)? as usize,
            artifact_records: artifact_records.len().map_err(storage_err)? as usize,
            trace_records: trace_records.len().map_err(storage_err)? as usize,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
