//! # Commit Pipeline
//!
//! The diff/commit protocol: turns a proposed set of additions,
//! modifications, and removals into durable version records.
//!
//! The pipeline is the ONLY writer of version records and trace-matrix
//! counters. All writes of one commit are staged into a `CommitTxn` and
//! applied by the store as a single atomic unit of work - partial
//! persistence under failure would violate the one-record-per-
//! (entity, version) invariant.
//!
//! Processing order matters: artifacts resolve before trace links, because
//! trace drafts reference their endpoints by artifact name.

use crate::matrix::{MatrixChange, MatrixKey, TraceMatrix};
use crate::notify::{ArtifactChange, ChangeDescription, TraceChange};
use crate::primitives::MAX_CHANGESET_LEN;
use crate::registry::Registry;
use crate::store::{CommitTxn, RecordLookup, VersionStore};
use crate::types::{
    Actor, ApprovalState, Artifact, ArtifactContent, ArtifactId, ArtifactRecord, Confidence,
    ModificationType, ProjectId, TraceKind, TraceLink, TraceLinkId, TraceRecord, TraceState,
    TracisError, VersionId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CHANGE SET
// =============================================================================

/// Proposed changes for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct EntityChanges<T> {
    #[serde(default)]
    pub added: Vec<T>,
    #[serde(default)]
    pub modified: Vec<T>,
    #[serde(default)]
    pub removed: Vec<T>,
}

impl<T> Default for EntityChanges<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> EntityChanges<T> {
    /// Total number of drafts across all three lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// True when no drafts are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A proposed artifact state, in application-facing form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub project: ProjectId,
    /// Raw type name; normalized to lowercase during validation.
    pub type_name: String,
    /// Name, unique within the project; also the removal selector.
    pub name: String,
    #[serde(default)]
    pub content: ArtifactContent,
}

/// A proposed trace link state. Endpoints are named by artifact name
/// within the project, which is how the base link is found or created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceDraft {
    pub project: ProjectId,
    pub source: String,
    pub target: String,
    pub kind: TraceKind,
    #[serde(default)]
    pub confidence: Confidence,
    pub approval: ApprovalState,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// The full proposed change of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChangeSet {
    #[serde(default)]
    pub artifacts: EntityChanges<ArtifactDraft>,
    #[serde(default)]
    pub traces: EntityChanges<TraceDraft>,
}

impl ChangeSet {
    /// Total number of drafts in the change set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len() + self.traces.len()
    }

    /// True when the change set proposes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every project named by any draft.
    #[must_use]
    pub fn projects(&self) -> BTreeSet<ProjectId> {
        let artifacts = self
            .artifacts
            .added
            .iter()
            .chain(&self.artifacts.modified)
            .chain(&self.artifacts.removed)
            .map(|d| d.project);
        let traces = self
            .traces
            .added
            .iter()
            .chain(&self.traces.modified)
            .chain(&self.traces.removed)
            .map(|d| d.project);
        artifacts.chain(traces).collect()
    }
}

// =============================================================================
// OPTIONS, ERRORS, OUTCOME
// =============================================================================

/// Commit behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitOptions {
    /// Abort the whole commit on the first per-entity error instead of
    /// collecting errors and persisting the rest.
    #[serde(default)]
    pub fail_on_error: bool,
    /// The supplied lists are the ENTIRE state at the version: any live
    /// entity not listed is implicitly removed.
    #[serde(default)]
    pub as_complete_set: bool,
}

/// Which processing activity a per-entity error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    Artifacts,
    Traces,
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Artifacts => write!(f, "artifacts"),
            Self::Traces => write!(f, "traces"),
        }
    }
}

/// Error class of a per-entity commit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitErrorKind {
    Validation,
    Conflict,
    NotFound,
}

/// A per-entity failure collected during a best-effort commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitError {
    pub activity: Activity,
    pub kind: CommitErrorKind,
    pub message: String,
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.activity, self.message)
    }
}

/// The result of a successful commit. In best-effort mode `errors` lists
/// the entities that were skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub version: VersionId,
    pub artifact_records: Vec<ArtifactRecord>,
    pub trace_records: Vec<TraceRecord>,
    pub errors: Vec<CommitError>,
    /// The change description handed to the notifier, exactly once.
    pub change: ChangeDescription,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Staged state of one in-flight commit, before the atomic apply.
struct CommitCtx {
    version: VersionId,
    actor: Actor,
    options: CommitOptions,
    errors: Vec<CommitError>,
    /// Base artifacts created by this commit, resolvable by (project, name)
    /// before they are durable - trace resolution needs them.
    staged_artifacts: BTreeMap<(ProjectId, String), Artifact>,
    staged_links: BTreeMap<(ProjectId, ArtifactId, ArtifactId), TraceLink>,
    new_artifacts: Vec<Artifact>,
    new_links: Vec<TraceLink>,
    /// Keyed by entity so duplicate drafts collapse to one record.
    artifact_records: BTreeMap<ArtifactId, ArtifactRecord>,
    trace_records: BTreeMap<TraceLinkId, TraceRecord>,
    /// Loaded lazily on the first trace record, written back whole.
    matrix: Option<TraceMatrix>,
    matrix_changes: Vec<MatrixChange>,
}

impl CommitCtx {
    fn new(version: VersionId, actor: &Actor, options: CommitOptions) -> Self {
        Self {
            version,
            actor: actor.clone(),
            options,
            errors: Vec::new(),
            staged_artifacts: BTreeMap::new(),
            staged_links: BTreeMap::new(),
            new_artifacts: Vec::new(),
            new_links: Vec::new(),
            artifact_records: BTreeMap::new(),
            trace_records: BTreeMap::new(),
            matrix: None,
            matrix_changes: Vec::new(),
        }
    }

    /// Route a per-entity error: abort in fail-fast mode, collect otherwise.
    fn report(&mut self, activity: Activity, err: TracisError) -> Result<(), TracisError> {
        let kind = match &err {
            TracisError::Validation(_) => CommitErrorKind::Validation,
            TracisError::Conflict(_) => CommitErrorKind::Conflict,
            TracisError::NotFound(_) => CommitErrorKind::NotFound,
            // Storage and serialization failures are always fatal.
            TracisError::Storage(_) | TracisError::Serialization(_) => return Err(err),
        };
        if self.options.fail_on_error {
            return Err(err);
        }
        self.errors.push(CommitError {
            activity,
            kind,
            message: err.to_string(),
        });
        Ok(())
    }

    fn find_staged_artifact(&self, project: ProjectId, name: &str) -> Option<Artifact> {
        self.staged_artifacts
            .get(&(project, name.to_string()))
            .cloned()
    }
}

/// The commit pipeline. Stateless; every call stands alone.
pub struct CommitPipeline;

impl CommitPipeline {
    /// Resolve and persist one change set against a version target.
    ///
    /// Returns the commit outcome on success - possibly with a non-empty
    /// error list in best-effort mode - or the first fatal error. Nothing
    /// is persisted on the error path.
    pub fn commit<S: VersionStore>(
        store: &mut S,
        version: VersionId,
        change_set: ChangeSet,
        actor: &Actor,
        options: CommitOptions,
    ) -> Result<CommitOutcome, TracisError> {
        if change_set.len() > MAX_CHANGESET_LEN {
            return Err(TracisError::Validation(format!(
                "change set exceeds {} drafts",
                MAX_CHANGESET_LEN
            )));
        }

        let change_set = if options.as_complete_set {
            Self::expand_complete_set(store, version, change_set)?
        } else {
            change_set
        };

        let mut ctx = CommitCtx::new(version, actor, options);

        // Artifact resolution must complete before trace resolution.
        Self::process_artifacts(store, &mut ctx, &change_set.artifacts)?;
        Self::process_traces(store, &mut ctx, &change_set.traces)?;

        let artifact_records: Vec<ArtifactRecord> =
            ctx.artifact_records.values().cloned().collect();
        let trace_records: Vec<TraceRecord> = ctx.trace_records.values().cloned().collect();

        let mut txn = CommitTxn::new(version);
        txn.new_artifacts = ctx.new_artifacts;
        txn.new_links = ctx.new_links;
        txn.artifact_records = artifact_records.clone();
        txn.trace_records = trace_records.clone();
        txn.matrix = ctx.matrix;
        if !txn.is_empty() {
            store.apply(txn)?;
        }

        let change = ChangeDescription {
            version,
            matrix_changes: ctx.matrix_changes,
            artifact_changes: artifact_records
                .iter()
                .map(|r| ArtifactChange {
                    artifact: r.artifact,
                    modification: r.modification,
                })
                .collect(),
            trace_changes: trace_records
                .iter()
                .map(|r| TraceChange {
                    link: r.link,
                    modification: r.modification,
                })
                .collect(),
        };

        Ok(CommitOutcome {
            version,
            artifact_records,
            trace_records,
            errors: ctx.errors,
            change,
        })
    }

    // =========================================================================
    // ARTIFACTS
    // =========================================================================

    fn process_artifacts<S: VersionStore>(
        store: &mut S,
        ctx: &mut CommitCtx,
        changes: &EntityChanges<ArtifactDraft>,
    ) -> Result<(), TracisError> {
        // Added and modified drafts share one resolve-then-upsert action;
        // the modification tag falls out of the prior record, not the list
        // the draft arrived in.
        let mut resolved: Vec<(Artifact, ArtifactContent)> = Vec::new();
        for draft in changes.added.iter().chain(&changes.modified) {
            match Self::resolve_or_create_artifact(store, ctx, draft) {
                Ok(artifact) => resolved.push((artifact, draft.content.clone())),
                Err(err) => ctx.report(Activity::Artifacts, err)?,
            }
        }

        // One batched read against the prior version for all touched ids.
        let ids: Vec<ArtifactId> = resolved.iter().map(|(a, _)| a.id).collect();
        let prior = store.artifact_records(ctx.version, &ids, RecordLookup::Before)?;

        for (artifact, content) in resolved {
            let modification = match prior.get(&artifact.id) {
                Some(record) if record.modification != ModificationType::Removed => {
                    ModificationType::Modified
                }
                _ => ModificationType::Added,
            };
            ctx.artifact_records.insert(
                artifact.id,
                ArtifactRecord {
                    artifact: artifact.id,
                    version: ctx.version,
                    modification,
                    author: ctx.actor.clone(),
                    content,
                },
            );
        }

        // Removals tombstone the effective record.
        let mut to_remove: Vec<Artifact> = Vec::new();
        for draft in &changes.removed {
            let artifact = match ctx.find_staged_artifact(draft.project, &draft.name) {
                Some(a) => Ok(a),
                None => Registry::resolve_artifact(store, draft.project, &draft.name),
            };
            match artifact {
                Ok(a) => to_remove.push(a),
                Err(err) => ctx.report(Activity::Artifacts, err)?,
            }
        }

        let remove_ids: Vec<ArtifactId> = to_remove.iter().map(|a| a.id).collect();
        let effective = store.artifact_records(ctx.version, &remove_ids, RecordLookup::AtOrBefore)?;

        for artifact in to_remove {
            let prior = ctx
                .artifact_records
                .get(&artifact.id)
                .cloned()
                .or_else(|| effective.get(&artifact.id).cloned());
            match prior {
                Some(record) if record.modification != ModificationType::Removed => {
                    ctx.artifact_records.insert(
                        artifact.id,
                        ArtifactRecord {
                            artifact: artifact.id,
                            version: ctx.version,
                            modification: ModificationType::Removed,
                            author: ctx.actor.clone(),
                            content: record.content,
                        },
                    );
                }
                _ => {
                    ctx.report(
                        Activity::Artifacts,
                        TracisError::NotFound(format!(
                            "artifact '{}' is not present at version {}",
                            artifact.name, ctx.version.0
                        )),
                    )?;
                }
            }
        }

        Ok(())
    }

    fn resolve_or_create_artifact<S: VersionStore>(
        store: &mut S,
        ctx: &mut CommitCtx,
        draft: &ArtifactDraft,
    ) -> Result<Artifact, TracisError> {
        let type_name = Registry::validate_artifact(draft)?;

        let existing = ctx
            .find_staged_artifact(draft.project, &draft.name)
            .map(Ok)
            .or_else(|| store.find_artifact(draft.project, &draft.name).transpose());

        if let Some(artifact) = existing.transpose()? {
            if artifact.type_name != type_name {
                return Err(TracisError::Conflict(format!(
                    "artifact '{}' already exists with type '{}'",
                    draft.name,
                    artifact.type_name.as_str()
                )));
            }
            return Ok(artifact);
        }

        let artifact = Artifact {
            id: store.allocate_artifact_id(),
            project: draft.project,
            type_name,
            name: draft.name.clone(),
        };
        ctx.staged_artifacts.insert(
            (artifact.project, artifact.name.clone()),
            artifact.clone(),
        );
        ctx.new_artifacts.push(artifact.clone());
        Ok(artifact)
    }

    // =========================================================================
    // TRACES
    // =========================================================================

    fn process_traces<S: VersionStore>(
        store: &mut S,
        ctx: &mut CommitCtx,
        changes: &EntityChanges<TraceDraft>,
    ) -> Result<(), TracisError> {
        struct ResolvedTrace {
            link: TraceLink,
            key: MatrixKey,
            new_state: Option<TraceState>, // None = removal tombstone
        }

        let mut resolved: Vec<ResolvedTrace> = Vec::new();

        for draft in changes.added.iter().chain(&changes.modified) {
            match Self::resolve_or_create_link(store, ctx, draft, true) {
                Ok((link, key)) => resolved.push(ResolvedTrace {
                    link,
                    key,
                    new_state: Some(TraceState {
                        kind: draft.kind,
                        confidence: draft.confidence,
                        approval: draft.approval,
                        visible: draft.visible,
                    }),
                }),
                Err(err) => ctx.report(Activity::Traces, err)?,
            }
        }

        for draft in &changes.removed {
            match Self::resolve_or_create_link(store, ctx, draft, false) {
                Ok((link, key)) => resolved.push(ResolvedTrace {
                    link,
                    key,
                    new_state: None,
                }),
                Err(err) => ctx.report(Activity::Traces, err)?,
            }
        }

        let ids: Vec<TraceLinkId> = resolved.iter().map(|r| r.link.id).collect();
        let prior = store.trace_records(ctx.version, &ids, RecordLookup::Before)?;
        let effective = store.trace_records(ctx.version, &ids, RecordLookup::AtOrBefore)?;

        for trace in resolved {
            let id = trace.link.id;
            // The state being replaced: a record staged earlier in this
            // commit wins over one already durable at the target version.
            let replaced = ctx
                .trace_records
                .get(&id)
                .map(|r| r.state)
                .or_else(|| effective.get(&id).map(|r| r.state));

            let new_state = match trace.new_state {
                Some(state) => {
                    if let Some(previous) = replaced
                        && previous.kind == TraceKind::Manual
                        && previous.approval == ApprovalState::Approved
                        && state.kind != TraceKind::Manual
                    {
                        ctx.report(
                            Activity::Traces,
                            TracisError::Conflict(format!(
                                "trace {} -> {} is an approved manual link; a generated link may not override it",
                                trace.link.source.0, trace.link.target.0
                            )),
                        )?;
                        continue;
                    }
                    state
                }
                None => match replaced {
                    Some(previous) if previous.approval.is_live() => {
                        TraceState::tombstone(previous)
                    }
                    _ => {
                        ctx.report(
                            Activity::Traces,
                            TracisError::NotFound(format!(
                                "trace {} -> {} is not live at version {}",
                                trace.link.source.0, trace.link.target.0, ctx.version.0
                            )),
                        )?;
                        continue;
                    }
                },
            };

            let modification = if trace.new_state.is_none() {
                ModificationType::Removed
            } else {
                match prior.get(&id) {
                    Some(record) if record.modification != ModificationType::Removed => {
                        ModificationType::Modified
                    }
                    _ => ModificationType::Added,
                }
            };

            // Aggregate only when the approval/visibility state actually
            // changed relative to the record being replaced.
            if replaced != Some(new_state) {
                if ctx.matrix.is_none() {
                    ctx.matrix = Some(store.matrix_effective(ctx.version)?);
                }
                if let Some(matrix) = ctx.matrix.as_mut()
                    && let Some(change) = matrix.apply_transition(&trace.key, new_state, replaced)
                {
                    ctx.matrix_changes.push(change);
                }
            }

            ctx.trace_records.insert(
                id,
                TraceRecord {
                    link: id,
                    version: ctx.version,
                    modification,
                    author: ctx.actor.clone(),
                    state: new_state,
                },
            );
        }

        Ok(())
    }

    fn resolve_or_create_link<S: VersionStore>(
        store: &mut S,
        ctx: &mut CommitCtx,
        draft: &TraceDraft,
        create_missing: bool,
    ) -> Result<(TraceLink, MatrixKey), TracisError> {
        Registry::validate_trace(draft)?;

        let source = match ctx.find_staged_artifact(draft.project, &draft.source) {
            Some(a) => a,
            None => Registry::resolve_artifact(store, draft.project, &draft.source)?,
        };
        let target = match ctx.find_staged_artifact(draft.project, &draft.target) {
            Some(a) => a,
            None => Registry::resolve_artifact(store, draft.project, &draft.target)?,
        };

        if source.project != draft.project || target.project != draft.project {
            return Err(TracisError::Validation(format!(
                "trace '{}' -> '{}' crosses project boundaries",
                draft.source, draft.target
            )));
        }

        let key = MatrixKey::new(source.type_name.clone(), target.type_name.clone());
        let index = (draft.project, source.id, target.id);

        if let Some(link) = ctx.staged_links.get(&index) {
            return Ok((link.clone(), key));
        }
        if let Some(link) = store.find_link(draft.project, source.id, target.id)? {
            return Ok((link, key));
        }
        if !create_missing {
            return Err(TracisError::NotFound(format!(
                "trace '{}' -> '{}' in project {}",
                draft.source, draft.target, draft.project.0
            )));
        }

        let link = TraceLink {
            id: store.allocate_link_id(),
            project: draft.project,
            source: source.id,
            target: target.id,
        };
        ctx.staged_links.insert(index, link.clone());
        ctx.new_links.push(link.clone());
        Ok((link, key))
    }

    // =========================================================================
    // COMPLETE-SET EXPANSION
    // =========================================================================

    /// Expand a complete-set change set: every live entity of a touched
    /// project that the caller did not list becomes an implicit removal.
    /// Projects not named by any draft are left untouched.
    fn expand_complete_set<S: VersionStore>(
        store: &S,
        version: VersionId,
        mut change_set: ChangeSet,
    ) -> Result<ChangeSet, TracisError> {
        let projects = change_set.projects();
        if projects.is_empty() {
            return Ok(change_set);
        }

        let listed_artifacts: BTreeSet<(ProjectId, String)> = change_set
            .artifacts
            .added
            .iter()
            .chain(&change_set.artifacts.modified)
            .chain(&change_set.artifacts.removed)
            .map(|d| (d.project, d.name.clone()))
            .collect();
        let listed_traces: BTreeSet<(ProjectId, String, String)> = change_set
            .traces
            .added
            .iter()
            .chain(&change_set.traces.modified)
            .chain(&change_set.traces.removed)
            .map(|d| (d.project, d.source.clone(), d.target.clone()))
            .collect();

        for (artifact, _) in store.live_artifacts(version)? {
            if !projects.contains(&artifact.project) {
                continue;
            }
            if listed_artifacts.contains(&(artifact.project, artifact.name.clone())) {
                continue;
            }
            change_set.artifacts.removed.push(ArtifactDraft {
                project: artifact.project,
                type_name: artifact.type_name.as_str().to_string(),
                name: artifact.name,
                content: ArtifactContent::default(),
            });
        }

        for (link, state) in store.live_links(version)? {
            if !projects.contains(&link.project) {
                continue;
            }
            let (Some(source), Some(target)) =
                (store.artifact(link.source)?, store.artifact(link.target)?)
            else {
                continue;
            };
            if listed_traces.contains(&(link.project, source.name.clone(), target.name.clone())) {
                continue;
            }
            change_set.traces.removed.push(TraceDraft {
                project: link.project,
                source: source.name,
                target: target.name,
                kind: state.kind,
                confidence: state.confidence,
                approval: state.approval,
                visible: state.visible,
            });
        }

        Ok(change_set)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn actor() -> Actor {
        Actor::new("tester")
    }

    fn artifact_draft(name: &str, type_name: &str) -> ArtifactDraft {
        ArtifactDraft {
            project: ProjectId(1),
            type_name: type_name.to_string(),
            name: name.to_string(),
            content: ArtifactContent::default(),
        }
    }

    fn trace_draft(source: &str, target: &str, kind: TraceKind, approval: ApprovalState) -> TraceDraft {
        TraceDraft {
            project: ProjectId(1),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            confidence: Confidence::CERTAIN,
            approval,
            visible: true,
        }
    }

    fn commit_artifacts(store: &mut MemoryStore, version: u64, drafts: Vec<ArtifactDraft>) {
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: drafts,
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        CommitPipeline::commit(
            store,
            VersionId(version),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");
    }

    #[test]
    fn added_artifact_creates_base_and_record() {
        let mut store = MemoryStore::new();
        let mut draft = artifact_draft("R1", "Requirement");
        draft.content.summary = "login requirement".to_string();
        draft
            .content
            .fields
            .insert("priority".to_string(), crate::types::FieldValue::Integer(1));
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![draft],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };

        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.artifact_records.len(), 1);
        assert_eq!(
            outcome.artifact_records[0].modification,
            ModificationType::Added
        );
        assert_eq!(
            outcome.artifact_records[0].content.summary,
            "login requirement"
        );
        assert_eq!(outcome.artifact_records[0].content.fields.len(), 1);

        let base = store
            .find_artifact(ProjectId(1), "R1")
            .expect("find")
            .expect("present");
        assert_eq!(base.type_name.as_str(), "requirement");
    }

    #[test]
    fn recommit_same_version_stays_added_with_one_record() {
        let mut store = MemoryStore::new();
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);

        let counts = store.counts().expect("counts");
        assert_eq!(counts.artifacts, 1);
        assert_eq!(counts.artifact_records, 1);

        let base = store
            .find_artifact(ProjectId(1), "R1")
            .expect("find")
            .expect("present");
        let records = store
            .artifact_records(VersionId(1), &[base.id], RecordLookup::AtOrBefore)
            .expect("records");
        assert_eq!(
            records.get(&base.id).map(|r| r.modification),
            Some(ModificationType::Added)
        );
    }

    #[test]
    fn later_version_classifies_as_modified() {
        let mut store = MemoryStore::new();
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);

        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![artifact_draft("R1", "requirement")],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(2),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert_eq!(
            outcome.artifact_records[0].modification,
            ModificationType::Modified
        );
    }

    #[test]
    fn removal_writes_tombstone() {
        let mut store = MemoryStore::new();
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);

        let change_set = ChangeSet {
            artifacts: EntityChanges {
                removed: vec![artifact_draft("R1", "requirement")],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(2),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert_eq!(
            outcome.artifact_records[0].modification,
            ModificationType::Removed
        );
        assert!(store.live_artifacts(VersionId(2)).expect("live").is_empty());
    }

    #[test]
    fn removing_missing_artifact_is_collected_error() {
        let mut store = MemoryStore::new();
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                removed: vec![artifact_draft("ghost", "requirement")],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };

        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("best-effort commit succeeds");

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, CommitErrorKind::NotFound);
        assert!(outcome.artifact_records.is_empty());
    }

    #[test]
    fn fail_fast_aborts_whole_commit() {
        let mut store = MemoryStore::new();
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![artifact_draft("R1", "requirement")],
                removed: vec![artifact_draft("ghost", "requirement")],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };

        let err = CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions {
                fail_on_error: true,
                as_complete_set: false,
            },
        )
        .expect_err("fail fast");
        assert!(matches!(err, TracisError::NotFound(_)));

        // Nothing persisted: the valid draft must not land either.
        assert_eq!(store.counts().expect("counts").artifacts, 0);
        assert_eq!(store.counts().expect("counts").artifact_records, 0);
    }

    #[test]
    fn trace_resolves_artifacts_created_in_same_commit() {
        let mut store = MemoryStore::new();
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![
                    artifact_draft("R1", "requirement"),
                    artifact_draft("D1", "design"),
                ],
                ..EntityChanges::default()
            },
            traces: EntityChanges {
                added: vec![trace_draft(
                    "R1",
                    "D1",
                    TraceKind::Manual,
                    ApprovalState::Approved,
                )],
                ..EntityChanges::default()
            },
        };

        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.trace_records.len(), 1);
        assert_eq!(store.live_links(VersionId(1)).expect("live").len(), 1);

        let matrix = store.matrix_effective(VersionId(1)).expect("matrix");
        let key = MatrixKey::new(
            crate::types::TypeName::new("requirement"),
            crate::types::TypeName::new("design"),
        );
        let entry = matrix.entry(&key).expect("entry");
        assert_eq!(entry.total, 1);
        assert_eq!(entry.generated_total, 0);
    }

    #[test]
    fn trace_to_missing_artifact_is_not_found() {
        let mut store = MemoryStore::new();
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);

        let change_set = ChangeSet {
            traces: EntityChanges {
                added: vec![trace_draft(
                    "R1",
                    "ghost",
                    TraceKind::Manual,
                    ApprovalState::Approved,
                )],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, CommitErrorKind::NotFound);
        assert_eq!(outcome.errors[0].activity, Activity::Traces);
        assert!(store.live_links(VersionId(1)).expect("live").is_empty());
    }

    #[test]
    fn generated_cannot_override_approved_manual() {
        let mut store = MemoryStore::new();
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![
                    artifact_draft("R1", "requirement"),
                    artifact_draft("D1", "design"),
                ],
                ..EntityChanges::default()
            },
            traces: EntityChanges {
                added: vec![trace_draft(
                    "R1",
                    "D1",
                    TraceKind::Manual,
                    ApprovalState::Approved,
                )],
                ..EntityChanges::default()
            },
        };
        CommitPipeline::commit(
            &mut store,
            VersionId(1),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        // A generated link over the approved manual one: rejected, record
        // unchanged.
        let mut generated = trace_draft("R1", "D1", TraceKind::Generated, ApprovalState::Proposed);
        generated.confidence = Confidence::from_thousandths(800);
        let change_set = ChangeSet {
            traces: EntityChanges {
                added: vec![generated],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(2),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, CommitErrorKind::Conflict);
        assert!(outcome.trace_records.is_empty());

        let live = store.live_links(VersionId(2)).expect("live");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].1.kind, TraceKind::Manual);
    }

    #[test]
    fn complete_set_removes_unlisted_entities() {
        let mut store = MemoryStore::new();
        commit_artifacts(
            &mut store,
            1,
            vec![
                artifact_draft("R1", "requirement"),
                artifact_draft("R2", "requirement"),
            ],
        );

        // Complete set for version 2 names only R1: R2 is implicitly removed.
        let change_set = ChangeSet {
            artifacts: EntityChanges {
                added: vec![artifact_draft("R1", "requirement")],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        CommitPipeline::commit(
            &mut store,
            VersionId(2),
            change_set,
            &actor(),
            CommitOptions {
                fail_on_error: false,
                as_complete_set: true,
            },
        )
        .expect("commit");

        let live = store.live_artifacts(VersionId(2)).expect("live");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0.name, "R1");
    }

    #[test]
    fn failed_entity_never_reaches_aggregator() {
        let mut store = MemoryStore::new();
        commit_artifacts(&mut store, 1, vec![artifact_draft("R1", "requirement")]);

        // Both traces fail resolution: the matrix must stay untouched.
        let change_set = ChangeSet {
            traces: EntityChanges {
                added: vec![
                    trace_draft("R1", "ghost", TraceKind::Manual, ApprovalState::Approved),
                    trace_draft("ghost", "R1", TraceKind::Manual, ApprovalState::Approved),
                ],
                ..EntityChanges::default()
            },
            ..ChangeSet::default()
        };
        let outcome = CommitPipeline::commit(
            &mut store,
            VersionId(2),
            change_set,
            &actor(),
            CommitOptions::default(),
        )
        .expect("commit");

        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.change.matrix_changes.is_empty());
        assert!(store.matrix_effective(VersionId(2)).expect("matrix").is_empty());
    }
}
