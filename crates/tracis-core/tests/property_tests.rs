//! # Property-Based Tests
//!
//! Verification tests for the consistency contract.
//!
//! These tests ensure the matrix counter invariant, the exclusivity of
//! transition classification, closure termination on arbitrary (cyclic)
//! graphs, and commit idempotency.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tracis_core::commit::{ArtifactDraft, ChangeSet, CommitOptions, CommitPipeline, EntityChanges};
use tracis_core::graph::TraceGraph;
use tracis_core::matrix::{MatrixKey, TraceMatrix, Transition};
use tracis_core::reach::ReachabilityCalculator;
use tracis_core::store::{MemoryStore, VersionStore};
use tracis_core::types::{
    Actor, ApprovalState, Artifact, ArtifactContent, ArtifactId, Confidence, ProjectId,
    TraceKind, TraceLink, TraceLinkId, TraceState, TypeName, VersionId,
};

// =============================================================================
// STRATEGIES
// =============================================================================

fn approval_strategy() -> impl Strategy<Value = ApprovalState> {
    prop_oneof![
        Just(ApprovalState::Approved),
        Just(ApprovalState::Proposed),
        Just(ApprovalState::Declined),
    ]
}

fn kind_strategy() -> impl Strategy<Value = TraceKind> {
    prop_oneof![Just(TraceKind::Manual), Just(TraceKind::Generated)]
}

fn state_strategy() -> impl Strategy<Value = TraceState> {
    (kind_strategy(), approval_strategy(), any::<bool>(), 0u16..=1000).prop_map(
        |(kind, approval, visible, confidence)| TraceState {
            kind,
            confidence: Confidence::from_thousandths(confidence),
            approval,
            visible,
        },
    )
}

/// One simulated aggregator operation: (link slot, proposed new state).
fn op_strategy() -> impl Strategy<Value = (usize, TraceState)> {
    (0usize..8, state_strategy())
}

/// Recompute the expected entry for one key from the live link states.
fn expected_entry(states: &BTreeMap<usize, TraceState>) -> (u64, u64, u64) {
    let mut total = 0;
    let mut generated_total = 0;
    let mut approved_generated = 0;
    for state in states.values() {
        if !state.approval.is_live() {
            continue;
        }
        total += 1;
        if state.kind == TraceKind::Generated {
            generated_total += 1;
            if state.approval == ApprovalState::Approved {
                approved_generated += 1;
            }
        }
    }
    (total, generated_total, approved_generated)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// After any sequence of link transitions, the counter ordering
    /// invariant holds and the entry matches a full recomputation from the
    /// live link states. The entry disappears exactly when total is zero.
    #[test]
    fn matrix_conservation_under_arbitrary_transitions(
        ops in vec(op_strategy(), 1..100)
    ) {
        let key = MatrixKey::new(TypeName::new("requirement"), TypeName::new("design"));
        let mut matrix = TraceMatrix::new();
        let mut states: BTreeMap<usize, TraceState> = BTreeMap::new();

        for (slot, new_state) in ops {
            let previous = states.get(&slot).copied();
            matrix.apply_transition(&key, new_state, previous);
            states.insert(slot, new_state);

            prop_assert!(matrix.is_consistent());

            let (total, generated_total, approved_generated) = expected_entry(&states);
            match matrix.entry(&key) {
                Some(entry) => {
                    prop_assert_eq!(entry.total, total);
                    prop_assert_eq!(entry.generated_total, generated_total);
                    prop_assert_eq!(entry.approved_generated, approved_generated);
                }
                None => prop_assert_eq!(total, 0),
            }
        }
    }

    /// Exactly one classification applies to every (new, previous) pair,
    /// and each variant fires precisely under its defining condition.
    #[test]
    fn transition_classification_is_exclusive(
        new in state_strategy(),
        previous in proptest::option::of(state_strategy())
    ) {
        let new_live = new.approval.is_live();
        let prev_live = previous.is_some_and(|p| p.approval.is_live());
        let counters_differ =
            previous.is_some_and(|p| p.approval != new.approval || p.kind != new.kind);

        let expected = if new_live && !prev_live {
            Transition::Added
        } else if !new_live && prev_live {
            Transition::Removed
        } else if new_live && prev_live && counters_differ {
            Transition::Modified
        } else {
            Transition::Unchanged
        };

        prop_assert_eq!(Transition::classify(new, previous), expected);
    }

    /// Closures terminate on arbitrary (possibly cyclic) graphs, never
    /// contain their own start node, and ancestors/descendants mirror each
    /// other: b is an ancestor of a exactly when a is a descendant of b.
    #[test]
    fn closures_terminate_and_mirror_on_random_graphs(
        edges in vec((0u64..12, 0u64..12), 0..60)
    ) {
        let artifacts: Vec<Artifact> = (0..12)
            .map(|i| Artifact {
                id: ArtifactId(i),
                project: ProjectId(1),
                type_name: TypeName::new("requirement"),
                name: format!("a{i}"),
            })
            .collect();
        let links: Vec<TraceLink> = edges
            .iter()
            .enumerate()
            .map(|(i, &(source, target))| TraceLink {
                id: TraceLinkId(i as u64),
                project: ProjectId(1),
                source: ArtifactId(source),
                target: ArtifactId(target),
            })
            .collect();

        let graph = TraceGraph::build(&artifacts, &links);
        let calc = ReachabilityCalculator::new(&graph);

        let mut ancestors = BTreeMap::new();
        let mut descendants = BTreeMap::new();
        for artifact in &artifacts {
            let up = calc.ancestors_of(artifact.id).expect("node exists");
            let down = calc.descendants_of(artifact.id).expect("node exists");
            prop_assert!(!up.contains(&artifact.id));
            prop_assert!(!down.contains(&artifact.id));
            ancestors.insert(artifact.id, up);
            descendants.insert(artifact.id, down);
        }

        for a in &artifacts {
            for b in &artifacts {
                if a.id == b.id {
                    continue;
                }
                let b_above_a = ancestors[&a.id].contains(&b.id);
                let a_below_b = descendants[&b.id].contains(&a.id);
                prop_assert_eq!(b_above_a, a_below_b);
            }
        }
    }

    /// Committing the same added artifact repeatedly at one version leaves
    /// exactly one ADDED record - the uniqueness invariant is structural.
    #[test]
    fn recommit_is_idempotent(times in 2usize..6, name in "[a-z]{1,12}") {
        let mut store = MemoryStore::new();
        let actor = Actor::new("prop");

        for _ in 0..times {
            let change_set = ChangeSet {
                artifacts: EntityChanges {
                    added: vec![ArtifactDraft {
                        project: ProjectId(1),
                        type_name: "requirement".to_string(),
                        name: name.clone(),
                        content: ArtifactContent::default(),
                    }],
                    ..EntityChanges::default()
                },
                ..ChangeSet::default()
            };
            let outcome = CommitPipeline::commit(
                &mut store,
                VersionId(1),
                change_set,
                &actor,
                CommitOptions::default(),
            )
            .expect("commit");
            prop_assert_eq!(
                outcome.artifact_records[0].modification,
                tracis_core::types::ModificationType::Added
            );
        }

        let counts = store.counts().expect("counts");
        prop_assert_eq!(counts.artifacts, 1);
        prop_assert_eq!(counts.artifact_records, 1);
    }

    /// Commits at distinct versions yield exactly one record per
    /// (entity, version) pair, regardless of how versions repeat.
    #[test]
    fn at_most_one_record_per_entity_version(versions in vec(1u64..6, 1..20)) {
        let mut store = MemoryStore::new();
        let actor = Actor::new("prop");
        let mut distinct = std::collections::BTreeSet::new();

        for version in versions {
            distinct.insert(version);
            let change_set = ChangeSet {
                artifacts: EntityChanges {
                    added: vec![ArtifactDraft {
                        project: ProjectId(1),
                        type_name: "requirement".to_string(),
                        name: "R1".to_string(),
                        content: ArtifactContent::default(),
                    }],
                    ..EntityChanges::default()
                },
                ..ChangeSet::default()
            };
            CommitPipeline::commit(
                &mut store,
                VersionId(version),
                change_set,
                &actor,
                CommitOptions::default(),
            )
            .expect("commit");
        }

        let counts = store.counts().expect("counts");
        prop_assert_eq!(counts.artifacts, 1);
        prop_assert_eq!(counts.artifact_records, distinct.len());
    }
}
