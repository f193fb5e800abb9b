//! # Reachability Calculator
//!
//! Ancestor/descendant closures and type-filtered neighborhoods over a
//! `TraceGraph`.
//!
//! All traversals are breadth-first with a visited-set guard: cyclic trace
//! graphs are legal input, and every closure terminates on them. Each
//! closure is O(V+E); callers computing closures for many artifacts should
//! build one graph and reuse one calculator rather than rebuilding per
//! artifact.

use crate::graph::TraceGraph;
use crate::types::{ArtifactId, TypeName};
use std::collections::{BTreeSet, VecDeque};

// =============================================================================
// REACHABILITY SET
// =============================================================================

/// The derived reachability view of one artifact.
///
/// Never persisted: rebuilt on demand from the live graph and not a source
/// of truth. Self is excluded from its own ancestor and descendant sets
/// even when a cycle leads back to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReachabilitySet {
    /// Direct parents (trace targets).
    pub parents: BTreeSet<ArtifactId>,
    /// Direct children (trace sources).
    pub children: BTreeSet<ArtifactId>,
    /// Full upward closure, excluding self.
    pub ancestors: BTreeSet<ArtifactId>,
    /// Full downward closure, excluding self.
    pub descendants: BTreeSet<ArtifactId>,
}

impl ReachabilitySet {
    /// Ancestors and descendants together; the parent/child distinction is
    /// not retained at this level.
    #[must_use]
    pub fn neighbors(&self) -> BTreeSet<ArtifactId> {
        self.ancestors.union(&self.descendants).copied().collect()
    }
}

// =============================================================================
// CALCULATOR
// =============================================================================

/// Edge direction followed by a closure walk.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Computes reachability over one borrowed graph build.
#[derive(Debug, Clone, Copy)]
pub struct ReachabilityCalculator<'a> {
    graph: &'a TraceGraph,
}

impl<'a> ReachabilityCalculator<'a> {
    /// Create a calculator over an already-built graph.
    #[must_use]
    pub fn new(graph: &'a TraceGraph) -> Self {
        Self { graph }
    }

    /// Full upward closure of an artifact, excluding itself.
    ///
    /// Returns `None` if the artifact is not in the graph.
    #[must_use]
    pub fn ancestors_of(&self, artifact: ArtifactId) -> Option<BTreeSet<ArtifactId>> {
        self.closure(artifact, Direction::Up)
    }

    /// Full downward closure of an artifact, excluding itself.
    #[must_use]
    pub fn descendants_of(&self, artifact: ArtifactId) -> Option<BTreeSet<ArtifactId>> {
        self.closure(artifact, Direction::Down)
    }

    /// Ancestors and descendants together.
    #[must_use]
    pub fn neighbors_of(&self, artifact: ArtifactId) -> Option<BTreeSet<ArtifactId>> {
        let mut up = self.closure(artifact, Direction::Up)?;
        let down = self.closure(artifact, Direction::Down)?;
        up.extend(down);
        Some(up)
    }

    /// The complete reachability view of one artifact.
    #[must_use]
    pub fn reachability(&self, artifact: ArtifactId) -> Option<ReachabilitySet> {
        let node = self.graph.node(artifact)?;
        Some(ReachabilitySet {
            parents: node.parents.clone(),
            children: node.children.clone(),
            ancestors: self.closure(artifact, Direction::Up)?,
            descendants: self.closure(artifact, Direction::Down)?,
        })
    }

    /// Type-filtered neighborhood search.
    ///
    /// Starting from `seed`, traverses across all neighbor edges (both
    /// directions) but only continues expanding through nodes whose type is
    /// in `allowed`, collecting every visited node of an allowed type. The
    /// seed itself is excluded from the result even when its own type is
    /// allowed, and even when a cycle leads back to it.
    #[must_use]
    pub fn neighborhood_with_types(
        &self,
        seed: ArtifactId,
        allowed: &BTreeSet<TypeName>,
    ) -> Option<BTreeSet<ArtifactId>> {
        self.graph.node(seed)?;

        let mut visited = BTreeSet::new();
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::new();

        visited.insert(seed);
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.graph.node(current) else {
                continue;
            };
            for &next in node.parents.iter().chain(node.children.iter()) {
                if !visited.insert(next) {
                    continue;
                }
                let Some(next_node) = self.graph.node(next) else {
                    continue;
                };
                // Disallowed nodes are neither collected nor expanded.
                if allowed.contains(&next_node.type_name) {
                    result.insert(next);
                    queue.push_back(next);
                }
            }
        }

        Some(result)
    }

    fn closure(&self, start: ArtifactId, direction: Direction) -> Option<BTreeSet<ArtifactId>> {
        self.graph.node(start)?;

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.graph.node(current) else {
                continue;
            };
            let next = match direction {
                Direction::Up => &node.parents,
                Direction::Down => &node.children,
            };
            for &candidate in next {
                if visited.insert(candidate) {
                    queue.push_back(candidate);
                }
            }
        }

        visited.remove(&start);
        Some(visited)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Artifact, ProjectId, TraceLink, TraceLinkId};

    fn artifact(id: u64, type_name: &str) -> Artifact {
        Artifact {
            id: ArtifactId(id),
            project: ProjectId(1),
            type_name: TypeName::new(type_name),
            name: format!("a{id}"),
        }
    }

    fn link(id: u64, source: u64, target: u64) -> TraceLink {
        TraceLink {
            id: TraceLinkId(id),
            project: ProjectId(1),
            source: ArtifactId(source),
            target: ArtifactId(target),
        }
    }

    fn ids(values: &[u64]) -> BTreeSet<ArtifactId> {
        values.iter().map(|&v| ArtifactId(v)).collect()
    }

    /// Chain: 1 -> 2 -> 3 (so 3 is an ancestor of 1, 1 a descendant of 3).
    fn chain_graph() -> TraceGraph {
        let artifacts = vec![
            artifact(1, "requirement"),
            artifact(2, "design"),
            artifact(3, "test"),
        ];
        let links = vec![link(10, 1, 2), link(11, 2, 3)];
        TraceGraph::build(&artifacts, &links)
    }

    #[test]
    fn ancestors_follow_parent_edges() {
        let graph = chain_graph();
        let calc = ReachabilityCalculator::new(&graph);

        assert_eq!(calc.ancestors_of(ArtifactId(1)), Some(ids(&[2, 3])));
        assert_eq!(calc.ancestors_of(ArtifactId(2)), Some(ids(&[3])));
        assert_eq!(calc.ancestors_of(ArtifactId(3)), Some(ids(&[])));
    }

    #[test]
    fn descendants_follow_child_edges() {
        let graph = chain_graph();
        let calc = ReachabilityCalculator::new(&graph);

        assert_eq!(calc.descendants_of(ArtifactId(3)), Some(ids(&[1, 2])));
        assert_eq!(calc.descendants_of(ArtifactId(1)), Some(ids(&[])));
    }

    #[test]
    fn missing_artifact_returns_none() {
        let graph = chain_graph();
        let calc = ReachabilityCalculator::new(&graph);

        assert_eq!(calc.ancestors_of(ArtifactId(99)), None);
        assert_eq!(calc.reachability(ArtifactId(99)), None);
    }

    #[test]
    fn closure_terminates_on_cycle_and_excludes_self() {
        // Cycle: 1 -> 2 -> 3 -> 1.
        let artifacts = vec![artifact(1, "r"), artifact(2, "r"), artifact(3, "r")];
        let links = vec![link(10, 1, 2), link(11, 2, 3), link(12, 3, 1)];
        let graph = TraceGraph::build(&artifacts, &links);
        let calc = ReachabilityCalculator::new(&graph);

        let ancestors = calc.ancestors_of(ArtifactId(1)).expect("ancestors");
        assert_eq!(ancestors, ids(&[2, 3]));
        assert!(!ancestors.contains(&ArtifactId(1)));

        let descendants = calc.descendants_of(ArtifactId(1)).expect("descendants");
        assert_eq!(descendants, ids(&[2, 3]));
        assert!(!descendants.contains(&ArtifactId(1)));
    }

    #[test]
    fn neighbors_union_both_closures() {
        let graph = chain_graph();
        let calc = ReachabilityCalculator::new(&graph);

        assert_eq!(calc.neighbors_of(ArtifactId(2)), Some(ids(&[1, 3])));

        let set = calc.reachability(ArtifactId(2)).expect("set");
        assert_eq!(set.neighbors(), ids(&[1, 3]));
        assert_eq!(set.parents, ids(&[3]));
        assert_eq!(set.children, ids(&[1]));
    }

    #[test]
    fn neighborhood_expands_only_through_allowed_types() {
        // 1(req) -> 2(design) -> 3(req), 1(req) -> 4(test) -> 5(req)
        // Allowed {requirement, design}: 3 reachable through 2, but 5 is
        // blocked behind the disallowed test node 4.
        let artifacts = vec![
            artifact(1, "requirement"),
            artifact(2, "design"),
            artifact(3, "requirement"),
            artifact(4, "test"),
            artifact(5, "requirement"),
        ];
        let links = vec![link(10, 1, 2), link(11, 2, 3), link(12, 1, 4), link(13, 4, 5)];
        let graph = TraceGraph::build(&artifacts, &links);
        let calc = ReachabilityCalculator::new(&graph);

        let allowed: BTreeSet<_> = [TypeName::new("requirement"), TypeName::new("design")]
            .into_iter()
            .collect();
        let result = calc
            .neighborhood_with_types(ArtifactId(1), &allowed)
            .expect("neighborhood");

        assert_eq!(result, ids(&[2, 3]));
    }

    #[test]
    fn neighborhood_excludes_seed_even_when_type_allowed() {
        // Cycle of one type so the walk returns to the seed.
        let artifacts = vec![artifact(1, "r"), artifact(2, "r")];
        let links = vec![link(10, 1, 2), link(11, 2, 1)];
        let graph = TraceGraph::build(&artifacts, &links);
        let calc = ReachabilityCalculator::new(&graph);

        let allowed: BTreeSet<_> = [TypeName::new("r")].into_iter().collect();
        let result = calc
            .neighborhood_with_types(ArtifactId(1), &allowed)
            .expect("neighborhood");

        assert_eq!(result, ids(&[2]));
    }

    #[test]
    fn neighborhood_crosses_both_edge_directions() {
        // 2 -> 1 and 1 -> 3: from 1, both 2 (child) and 3 (parent) reachable.
        let artifacts = vec![artifact(1, "r"), artifact(2, "r"), artifact(3, "r")];
        let links = vec![link(10, 2, 1), link(11, 1, 3)];
        let graph = TraceGraph::build(&artifacts, &links);
        let calc = ReachabilityCalculator::new(&graph);

        let allowed: BTreeSet<_> = [TypeName::new("r")].into_iter().collect();
        let result = calc
            .neighborhood_with_types(ArtifactId(1), &allowed)
            .expect("neighborhood");

        assert_eq!(result, ids(&[2, 3]));
    }
}
