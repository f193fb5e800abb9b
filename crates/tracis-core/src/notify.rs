//! # Change Notifier Interface
//!
//! The consumer-facing boundary the commit pipeline reports into after a
//! successful commit.
//!
//! The engine guarantees a `ChangeDescription` is produced exactly once per
//! successful commit and never for a failed or aborted one. Delivery
//! (websockets, cache invalidation, notification fan-out) is the host
//! application's concern; the engine only defines the contract.

use crate::matrix::MatrixChange;
use crate::types::{ArtifactId, ModificationType, TraceLinkId, VersionId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// =============================================================================
// CHANGE DESCRIPTION
// =============================================================================

/// One artifact's version-record change within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactChange {
    pub artifact: ArtifactId,
    pub modification: ModificationType,
}

/// One trace link's version-record change within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceChange {
    pub link: TraceLinkId,
    pub modification: ModificationType,
}

/// Everything one successful commit changed, for downstream consumers
/// deciding which derived caches (layouts, saved views) are now stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescription {
    /// The version the commit targeted.
    pub version: VersionId,
    /// Matrix entries updated or deleted by the commit.
    pub matrix_changes: Vec<MatrixChange>,
    /// Artifacts whose version records were written.
    pub artifact_changes: Vec<ArtifactChange>,
    /// Trace links whose version records were written.
    pub trace_changes: Vec<TraceChange>,
}

impl ChangeDescription {
    /// True when the commit wrote nothing (an empty change set).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix_changes.is_empty()
            && self.artifact_changes.is_empty()
            && self.trace_changes.is_empty()
    }
}

// =============================================================================
// NOTIFIER TRAIT
// =============================================================================

/// Receives the change description of each successful commit.
///
/// Implementors must be `Send + Sync`; the host may invoke commits from
/// many request-handling threads. Implementations should be cheap - the
/// engine calls them synchronously at the end of the commit path.
pub trait ChangeNotifier: Send + Sync {
    /// Called exactly once per successful commit.
    fn notify(&self, change: &ChangeDescription);
}

/// A notifier that records every description it receives.
///
/// Used by tests asserting the exactly-once contract; also handy as a
/// trivial in-process feed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<ChangeDescription>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptions received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// True when nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all recorded descriptions.
    #[must_use]
    pub fn take(&self) -> Vec<ChangeDescription> {
        self.changes
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default()
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn notify(&self, change: &ChangeDescription) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(change.clone());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_accumulates() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.is_empty());

        let change = ChangeDescription {
            version: VersionId(1),
            matrix_changes: vec![],
            artifact_changes: vec![ArtifactChange {
                artifact: ArtifactId(7),
                modification: ModificationType::Added,
            }],
            trace_changes: vec![],
        };

        notifier.notify(&change);
        notifier.notify(&change);
        assert_eq!(notifier.len(), 2);

        let taken = notifier.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0], change);
        assert!(notifier.is_empty());
    }

    #[test]
    fn empty_description_reports_empty() {
        let change = ChangeDescription {
            version: VersionId(1),
            matrix_changes: vec![],
            artifact_changes: vec![],
            trace_changes: vec![],
        };
        assert!(change.is_empty());
    }
}
