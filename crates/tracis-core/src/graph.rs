//! # Trace Graph
//!
//! The in-memory directed graph of artifacts and trace links.
//!
//! A `TraceGraph` is built per request from one version's live entity set
//! and is a read-only view: it holds no persistent identity and must never
//! be treated as a cache across commits. All structures use `BTreeMap` for
//! deterministic ordering.

use crate::types::{Artifact, ArtifactId, TraceLink, TypeName};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// NODES
// =============================================================================

/// One artifact in the graph, with its direct neighborhood.
///
/// Directional convention (must be preserved exactly, it defines
/// ancestor/descendant semantics everywhere): for a trace link
/// source -> target, the TARGET is a parent of the source and the SOURCE
/// is a child of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceNode {
    /// The artifact this node represents.
    pub artifact: ArtifactId,
    /// Normalized type name, used by type-filtered traversals.
    pub type_name: TypeName,
    /// Direct parents: targets of links whose source is this artifact.
    pub parents: BTreeSet<ArtifactId>,
    /// Direct children: sources of links whose target is this artifact.
    pub children: BTreeSet<ArtifactId>,
}

impl TraceNode {
    fn new(artifact: ArtifactId, type_name: TypeName) -> Self {
        Self {
            artifact,
            type_name,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
        }
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// The trace graph: an arena of nodes indexed by artifact id.
///
/// Indexing by id with explicit adjacency sets (instead of nodes that
/// reference each other) keeps traversal free of reference-cycle lifetime
/// issues even though cyclic trace graphs are legal input.
#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    nodes: BTreeMap<ArtifactId, TraceNode>,
}

impl TraceGraph {
    /// Build a graph from one version's artifacts and trace links.
    ///
    /// One node per artifact; one parent/child edge pair per link. Links
    /// whose endpoints are not in `artifacts` are skipped - a link to a
    /// removed artifact contributes no edge.
    #[must_use]
    pub fn build(artifacts: &[Artifact], links: &[TraceLink]) -> Self {
        let mut graph = Self::default();

        for artifact in artifacts {
            graph
                .nodes
                .entry(artifact.id)
                .or_insert_with(|| TraceNode::new(artifact.id, artifact.type_name.clone()));
        }

        for link in links {
            if !graph.nodes.contains_key(&link.source) || !graph.nodes.contains_key(&link.target) {
                continue;
            }
            if let Some(source) = graph.nodes.get_mut(&link.source) {
                source.parents.insert(link.target);
            }
            if let Some(target) = graph.nodes.get_mut(&link.target) {
                target.children.insert(link.source);
            }
        }

        graph
    }

    /// Lookup a node by artifact id.
    #[must_use]
    pub fn node(&self, id: ArtifactId) -> Option<&TraceNode> {
        self.nodes.get(&id)
    }

    /// Check if the graph contains an artifact.
    #[must_use]
    pub fn contains(&self, id: ArtifactId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in deterministic order.
    pub fn nodes(&self) -> impl Iterator<Item = &TraceNode> {
        self.nodes.values()
    }

    /// Number of artifacts in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edges (counted once per link).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.parents.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
