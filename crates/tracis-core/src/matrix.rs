//! # Trace Matrix Aggregator
//!
//! Per-(source type, target type) link counters, maintained incrementally
//! as individual trace links transition - never by full recomputation.
//!
//! Counter invariant, which must hold after every update:
//! `approved_generated <= generated_total <= total`.

use crate::types::{ApprovalState, TraceKind, TraceState, TypeName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// KEYS & ENTRIES
// =============================================================================

/// Matrix key: the (source type, target type) pair of a trace link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixKey {
    pub source_type: TypeName,
    pub target_type: TypeName,
}

impl MatrixKey {
    /// Create a key from the two endpoint types.
    #[must_use]
    pub fn new(source_type: TypeName, target_type: TypeName) -> Self {
        Self {
            source_type,
            target_type,
        }
    }
}

/// Counters for one type pair.
///
/// Entries are created lazily on the first live link between the pair and
/// deleted when `total` drains to zero. Decrements saturate; a decrement
/// that would underflow indicates an aggregation bug upstream, not a state
/// to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatrixEntry {
    /// Live links between the pair.
    pub total: u64,
    /// Live links of kind Generated.
    pub generated_total: u64,
    /// Approved links among the generated ones.
    pub approved_generated: u64,
}

impl MatrixEntry {
    fn apply(&mut self, state: TraceState, delta: Delta) {
        let bump = |counter: &mut u64| match delta {
            Delta::Increment => *counter = counter.saturating_add(1),
            Delta::Decrement => *counter = counter.saturating_sub(1),
        };
        bump(&mut self.total);
        if state.kind == TraceKind::Generated {
            bump(&mut self.generated_total);
            if state.approval == ApprovalState::Approved {
                bump(&mut self.approved_generated);
            }
        }
    }

    /// Check the counter ordering invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.approved_generated <= self.generated_total && self.generated_total <= self.total
    }
}

#[derive(Debug, Clone, Copy)]
enum Delta {
    Increment,
    Decrement,
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Classification of one link state change, computed once per trace link
/// per commit.
///
/// Precedence is added, then removed, then modified; exactly one variant
/// (or `Unchanged`) applies to any transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// New state is live, previous was absent or declined.
    Added,
    /// New state is declined, previous was live.
    Removed,
    /// Both live, counter-relevant state (approval or kind) differs.
    Modified,
    /// No counter-relevant change.
    Unchanged,
}

impl Transition {
    /// Classify a state change relative to the record it replaces.
    #[must_use]
    pub fn classify(new: TraceState, previous: Option<TraceState>) -> Self {
        let new_live = new.approval.is_live();
        let prev_live = previous.is_some_and(|p| p.approval.is_live());

        if new_live && !prev_live {
            Self::Added
        } else if !new_live && prev_live {
            Self::Removed
        } else if new_live
            && prev_live
            && previous.is_some_and(|p| p.approval != new.approval || p.kind != new.kind)
        {
            Self::Modified
        } else {
            Self::Unchanged
        }
    }
}

// =============================================================================
// CHANGES
// =============================================================================

/// What an update did to one matrix entry, reported to the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixChange {
    /// Entry created or counters adjusted.
    Updated { key: MatrixKey, entry: MatrixEntry },
    /// Entry drained to zero and was deleted.
    Deleted { key: MatrixKey },
}

// =============================================================================
// MATRIX
// =============================================================================

/// The trace matrix of one version: counters per type pair.
///
/// Only the commit pipeline writes matrices; everything else reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TraceMatrix {
    entries: BTreeMap<MatrixKey, MatrixEntry>,
}

impl TraceMatrix {
    /// Create an empty matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one link transition to the entry for `key`.
    ///
    /// - added: increment using the NEW state (entry lazily created)
    /// - removed: decrement using the PREVIOUS state; the entry is deleted
    ///   when `total` reaches zero and a delete change is emitted instead
    ///   of an update
    /// - modified: decrement previous then increment new on the same entry,
    ///   which migrates a link between e.g. generated/proposed and
    ///   generated/approved without double counting
    ///
    /// Returns `None` when the transition is counter-irrelevant.
    pub fn apply_transition(
        &mut self,
        key: &MatrixKey,
        new: TraceState,
        previous: Option<TraceState>,
    ) -> Option<MatrixChange> {
        match Transition::classify(new, previous) {
            Transition::Added => {
                let entry = self.entries.entry(key.clone()).or_default();
                entry.apply(new, Delta::Increment);
                Some(MatrixChange::Updated {
                    key: key.clone(),
                    entry: *entry,
                })
            }
            Transition::Removed => {
                let prev = previous?;
                let entry = self.entries.entry(key.clone()).or_default();
                entry.apply(prev, Delta::Decrement);
                let updated = *entry;
                if updated.total == 0 {
                    self.entries.remove(key);
                    Some(MatrixChange::Deleted { key: key.clone() })
                } else {
                    Some(MatrixChange::Updated {
                        key: key.clone(),
                        entry: updated,
                    })
                }
            }
            Transition::Modified => {
                let prev = previous?;
                let entry = self.entries.entry(key.clone()).or_default();
                entry.apply(prev, Delta::Decrement);
                entry.apply(new, Delta::Increment);
                Some(MatrixChange::Updated {
                    key: key.clone(),
                    entry: *entry,
                })
            }
            Transition::Unchanged => None,
        }
    }

    /// Lookup the entry for one type pair.
    #[must_use]
    pub fn entry(&self, key: &MatrixKey) -> Option<MatrixEntry> {
        self.entries.get(key).copied()
    }

    /// All entries in deterministic key order.
    pub fn entries(&self) -> impl Iterator<Item = (&MatrixKey, &MatrixEntry)> {
        self.entries.iter()
    }

    /// Number of type pairs with live links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no type pair has live links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the counter invariant over every entry.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.entries.values().all(MatrixEntry::is_consistent)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Confidence;

    fn state(kind: TraceKind, approval: ApprovalState) -> TraceState {
        TraceState {
            kind,
            confidence: Confidence::from_thousandths(800),
            approval,
            visible: true,
        }
    }

    fn key() -> MatrixKey {
        MatrixKey::new(TypeName::new("requirement"), TypeName::new("design"))
    }

    #[test]
    fn added_manual_increments_total_only() {
        let mut matrix = TraceMatrix::new();
        let change = matrix.apply_transition(
            &key(),
            state(TraceKind::Manual, ApprovalState::Approved),
            None,
        );

        assert!(matches!(change, Some(MatrixChange::Updated { .. })));
        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!(entry.total, 1);
        assert_eq!(entry.generated_total, 0);
        assert_eq!(entry.approved_generated, 0);
    }

    #[test]
    fn added_generated_approved_increments_all_three() {
        let mut matrix = TraceMatrix::new();
        matrix.apply_transition(
            &key(),
            state(TraceKind::Generated, ApprovalState::Approved),
            None,
        );

        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!(entry.total, 1);
        assert_eq!(entry.generated_total, 1);
        assert_eq!(entry.approved_generated, 1);
    }

    #[test]
    fn removed_decrements_using_previous_state() {
        let mut matrix = TraceMatrix::new();
        let generated = state(TraceKind::Generated, ApprovalState::Approved);
        matrix.apply_transition(&key(), generated, None);
        matrix.apply_transition(
            &key(),
            state(TraceKind::Generated, ApprovalState::Approved),
            None,
        );

        // Decline one: counters drop by the previous record's shape,
        // not by the now-declined new state.
        let change = matrix.apply_transition(
            &key(),
            TraceState::tombstone(generated),
            Some(generated),
        );
        assert!(matches!(change, Some(MatrixChange::Updated { .. })));

        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!(entry.total, 1);
        assert_eq!(entry.generated_total, 1);
        assert_eq!(entry.approved_generated, 1);
    }

    #[test]
    fn entry_deleted_when_total_reaches_zero() {
        let mut matrix = TraceMatrix::new();
        let manual = state(TraceKind::Manual, ApprovalState::Approved);
        matrix.apply_transition(&key(), manual, None);

        let change = matrix.apply_transition(&key(), TraceState::tombstone(manual), Some(manual));
        assert_eq!(change, Some(MatrixChange::Deleted { key: key() }));
        assert!(matrix.entry(&key()).is_none());
        assert!(matrix.is_empty());
    }

    #[test]
    fn modified_migrates_approval_without_double_count() {
        let mut matrix = TraceMatrix::new();
        let proposed = state(TraceKind::Generated, ApprovalState::Proposed);
        matrix.apply_transition(&key(), proposed, None);

        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!((entry.total, entry.generated_total, entry.approved_generated), (1, 1, 0));

        let approved = state(TraceKind::Generated, ApprovalState::Approved);
        matrix.apply_transition(&key(), approved, Some(proposed));

        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!((entry.total, entry.generated_total, entry.approved_generated), (1, 1, 1));
    }

    #[test]
    fn re_adding_after_decline_counts_as_added() {
        let mut matrix = TraceMatrix::new();
        let manual = state(TraceKind::Manual, ApprovalState::Approved);
        let declined = TraceState::tombstone(manual);

        matrix.apply_transition(&key(), manual, None);
        matrix.apply_transition(&key(), declined, Some(manual));
        assert!(matrix.is_empty());

        // Previous state is declined: this is an add, not a modify.
        matrix.apply_transition(&key(), manual, Some(declined));
        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!(entry.total, 1);
    }

    #[test]
    fn unchanged_state_yields_no_change() {
        let mut matrix = TraceMatrix::new();
        let manual = state(TraceKind::Manual, ApprovalState::Approved);
        matrix.apply_transition(&key(), manual, None);

        let change = matrix.apply_transition(&key(), manual, Some(manual));
        assert_eq!(change, None);
        let entry = matrix.entry(&key()).expect("entry");
        assert_eq!(entry.total, 1);
    }

    #[test]
    fn classification_is_exclusive() {
        let live = state(TraceKind::Generated, ApprovalState::Proposed);
        let approved = state(TraceKind::Generated, ApprovalState::Approved);
        let dead = TraceState::tombstone(live);

        assert_eq!(Transition::classify(live, None), Transition::Added);
        assert_eq!(Transition::classify(live, Some(dead)), Transition::Added);
        assert_eq!(Transition::classify(dead, Some(live)), Transition::Removed);
        assert_eq!(
            Transition::classify(approved, Some(live)),
            Transition::Modified
        );
        assert_eq!(Transition::classify(live, Some(live)), Transition::Unchanged);
        assert_eq!(Transition::classify(dead, Some(dead)), Transition::Unchanged);
        assert_eq!(Transition::classify(dead, None), Transition::Unchanged);
    }

    #[test]
    fn invariant_holds_after_mixed_sequence() {
        let mut matrix = TraceMatrix::new();
        let k = key();
        let proposed = state(TraceKind::Generated, ApprovalState::Proposed);
        let approved = state(TraceKind::Generated, ApprovalState::Approved);
        let manual = state(TraceKind::Manual, ApprovalState::Approved);

        matrix.apply_transition(&k, proposed, None);
        assert!(matrix.is_consistent());
        matrix.apply_transition(&k, approved, Some(proposed));
        assert!(matrix.is_consistent());
        matrix.apply_transition(&k, manual, None);
        assert!(matrix.is_consistent());
        matrix.apply_transition(&k, TraceState::tombstone(approved), Some(approved));
        assert!(matrix.is_consistent());
        matrix.apply_transition(&k, TraceState::tombstone(manual), Some(manual));
        assert!(matrix.is_consistent());
        assert!(matrix.is_empty());
    }
}
