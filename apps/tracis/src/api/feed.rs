//! # In-Process Change Feed
//!
//! A bounded ring buffer of change descriptions, installed on the engine
//! as its change notifier. The HTTP `/changes` endpoint serves its
//! contents for external fan-out (websocket bridges, cache invalidation).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracis_core::{ChangeDescription, ChangeNotifier};

/// How many change descriptions the feed retains.
const FEED_CAPACITY: usize = 256;

/// Bounded in-memory feed of commit change descriptions.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    changes: Mutex<VecDeque<ChangeDescription>>,
}

impl ChangeFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one description, evicting the oldest beyond capacity.
    pub fn push(&self, change: ChangeDescription) {
        if let Ok(mut changes) = self.changes.lock() {
            if changes.len() == FEED_CAPACITY {
                changes.pop_front();
            }
            changes.push_back(change);
        }
    }

    /// Snapshot of retained descriptions, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<ChangeDescription> {
        self.changes
            .lock()
            .map(|changes| changes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Adapter installing a shared feed as the engine's notifier.
///
/// Empty descriptions (a commit that wrote nothing) are not fed; there is
/// nothing downstream to invalidate.
pub struct FeedNotifier(pub Arc<ChangeFeed>);

impl ChangeNotifier for FeedNotifier {
    fn notify(&self, change: &ChangeDescription) {
        if !change.is_empty() {
            self.0.push(change.clone());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
