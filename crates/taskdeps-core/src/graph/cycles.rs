//! Cycle prevention and detection for the Blocks subgraph.
//!
//! # Overview
//!
//! `Blocks` edges form a directed graph that must stay acyclic: a cycle makes
//! every task on it wait on itself. [`CycleGuard`] enforces this at insert
//! time; [`find_cycles`] and [`has_cycles`] are post-hoc diagnostics for
//! stores that were edited outside the engine.
//!
//! # Design
//!
//! - **DFS-based**: before committing `A → B` (A depends on B), search from
//!   `B` along existing Blocks edges. If `A` is reachable the new edge would
//!   close a cycle.
//! - **Reject, don't warn**: the offending edge is never committed; the error
//!   carries the cycle path `[A, B, …, A]`.
//! - **Deterministic**: neighbors are visited in insertion order and the
//!   first path found is reported, so the same graph always yields the same
//!   path.
//! - **O(V+E)**: one visited set per check; each node and edge is touched at
//!   most once. The search uses an explicit stack, so long dependency chains
//!   cannot overflow the call stack.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::adjacency::GraphStore;
use crate::error::DependencyError;
use crate::model::{DependencyType, TaskId};

// ---------------------------------------------------------------------------
// CycleGuard
// ---------------------------------------------------------------------------

/// Validates proposed edges against a committed graph snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CycleGuard<'g> {
    graph: &'g GraphStore,
}

impl<'g> CycleGuard<'g> {
    #[must_use]
    pub const fn new(graph: &'g GraphStore) -> Self {
        Self { graph }
    }

    /// Check whether `from → to` of type `dep_type` may be committed.
    ///
    /// `RelatesTo` edges only get the self-loop check.
    ///
    /// # Errors
    ///
    /// - [`DependencyError::SelfDependency`] when `from == to` (no search is
    ///   run).
    /// - [`DependencyError::CircularDependency`] with the cycle path when a
    ///   `Blocks` edge would close a loop.
    pub fn check(
        &self,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<(), DependencyError> {
        if from == to {
            return Err(DependencyError::SelfDependency(from.clone()));
        }

        if !dep_type.is_constraining() {
            return Ok(());
        }

        match self.path_between(to, from) {
            Some(path_to_from) => {
                let mut path = Vec::with_capacity(path_to_from.len() + 1);
                path.push(from.clone());
                path.extend(path_to_from);
                tracing::debug!(?path, "blocking edge rejected: cycle");
                Err(DependencyError::CircularDependency { path })
            }
            None => Ok(()),
        }
    }

    /// Depth-first search from `start` along Blocks edges for `target`.
    ///
    /// Returns the visited path `[start, …, target]` of the first hit.
    fn path_between<'a>(&self, start: &'a TaskId, target: &TaskId) -> Option<Vec<TaskId>>
    where
        'g: 'a,
    {
        let mut visited: HashSet<&'a TaskId> = HashSet::new();
        visited.insert(start);

        // Each frame: node, its prerequisites, and the next one to try.
        let mut stack: Vec<(&'a TaskId, Vec<&'a TaskId>, usize)> =
            vec![(start, self.graph.prerequisites(start).collect(), 0)];

        while let Some((node, next, cursor)) = stack.last_mut() {
            if *node == target {
                return Some(stack.iter().map(|(n, _, _)| (*n).clone()).collect());
            }

            let Some(neighbor) = next.get(*cursor).copied() else {
                stack.pop();
                continue;
            };
            *cursor += 1;

            if visited.insert(neighbor) {
                let prereqs: Vec<&'a TaskId> = self.graph.prerequisites(neighbor).collect();
                stack.push((neighbor, prereqs, 0));
            }
        }

        None
    }
}

/// Convenience wrapper: would committing `from → to` as `Blocks` close a
/// cycle? Returns the cycle path if so.
#[must_use]
pub fn would_create_cycle(graph: &GraphStore, from: &TaskId, to: &TaskId) -> Option<Vec<TaskId>> {
    match CycleGuard::new(graph).check(from, to, DependencyType::Blocks) {
        Err(DependencyError::CircularDependency { path }) => Some(path),
        Err(DependencyError::SelfDependency(id)) => Some(vec![id.clone(), id]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Post-hoc diagnostics
// ---------------------------------------------------------------------------

/// A strongly connected group of tasks in the Blocks subgraph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    /// Sorted task ids forming the strongly connected component.
    pub members: Vec<TaskId>,
}

/// Find every cycle currently present in the Blocks subgraph.
///
/// Each report is one strongly connected component with more than one
/// member. Self-loops cannot exist because [`GraphStore`] rejects them.
/// Reports are sorted for stable output.
#[must_use]
pub fn find_cycles(graph: &GraphStore) -> Vec<CycleReport> {
    let dag = blocking_digraph(graph);

    let mut reports: Vec<CycleReport> = tarjan_scc(&dag)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut members: Vec<TaskId> = component
                .into_iter()
                .filter_map(|idx| dag.node_weight(idx).cloned())
                .collect();
            members.sort_unstable();
            CycleReport { members }
        })
        .collect();

    reports.sort_unstable_by(|a, b| a.members.cmp(&b.members));
    reports
}

/// Whether the Blocks subgraph contains any cycle.
#[must_use]
pub fn has_cycles(graph: &GraphStore) -> bool {
    let dag = blocking_digraph(graph);
    petgraph::algo::is_cyclic_directed(&dag)
}

/// Project the Blocks edges into a petgraph digraph (`dependent → prerequisite`).
fn blocking_digraph(graph: &GraphStore) -> DiGraph<TaskId, ()> {
    let mut dag = DiGraph::<TaskId, ()>::new();
    let mut nodes: HashMap<TaskId, NodeIndex> = HashMap::new();

    for edge in graph.edges() {
        if !edge.dep_type.is_constraining() {
            continue;
        }
        let from = *nodes
            .entry(edge.from.clone())
            .or_insert_with(|| dag.add_node(edge.from.clone()));
        let to = *nodes
            .entry(edge.to.clone())
            .or_insert_with(|| dag.add_node(edge.to.clone()));
        dag.add_edge(from, to, ());
    }

    dag
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, EdgeId};
    use chrono::Utc;

    fn graph(edges: &[(&str, &str)]) -> GraphStore {
        graph_typed(
            &edges
                .iter()
                .map(|(a, b)| (*a, *b, DependencyType::Blocks))
                .collect::<Vec<_>>(),
        )
    }

    fn graph_typed(edges: &[(&str, &str, DependencyType)]) -> GraphStore {
        GraphStore::from_edges(edges.iter().enumerate().map(|(i, (from, to, dep_type))| {
            DependencyEdge {
                id: EdgeId::new(i as u64 + 1),
                from: TaskId::from(*from),
                to: TaskId::from(*to),
                dep_type: *dep_type,
                created_at: Utc::now(),
            }
        }))
    }

    fn path(ids: &[&str]) -> Vec<TaskId> {
        ids.iter().map(|id| TaskId::from(*id)).collect()
    }

    fn check(g: &GraphStore, from: &str, to: &str) -> Result<(), DependencyError> {
        CycleGuard::new(g).check(&from.into(), &to.into(), DependencyType::Blocks)
    }

    #[test]
    fn self_dependency_rejected_without_search() {
        let g = GraphStore::new();
        let err = check(&g, "A", "A").unwrap_err();
        assert!(matches!(err, DependencyError::SelfDependency(ref id) if id.as_str() == "A"));
    }

    #[test]
    fn self_relates_to_also_rejected() {
        let g = GraphStore::new();
        let err = CycleGuard::new(&g)
            .check(&"A".into(), &"A".into(), DependencyType::RelatesTo)
            .unwrap_err();
        assert!(matches!(err, DependencyError::SelfDependency(_)));
    }

    #[test]
    fn mutual_block_detected() {
        let g = graph(&[("A", "B")]);
        let err = check(&g, "B", "A").unwrap_err();
        match err {
            DependencyError::CircularDependency { path: p } => {
                assert_eq!(p, path(&["B", "A", "B"]));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn three_node_cycle_reports_full_path() {
        // C depends on B, B depends on A. Adding A → C closes A → C → B → A.
        let g = graph(&[("C", "B"), ("B", "A")]);
        let err = check(&g, "A", "C").unwrap_err();
        match err {
            DependencyError::CircularDependency { path: p } => {
                assert_eq!(p, path(&["A", "C", "B", "A"]));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn path_follows_insertion_order() {
        // Two routes from S back to A; the first-inserted neighbor wins.
        let g = graph(&[("S", "X"), ("S", "Y"), ("X", "A"), ("Y", "A")]);
        let first = check(&g, "A", "S").unwrap_err();
        let again = check(&g, "A", "S").unwrap_err();

        let DependencyError::CircularDependency { path: p } = first else {
            panic!("expected cycle");
        };
        assert_eq!(p, path(&["A", "S", "X", "A"]));
        assert_eq!(again.to_string(), "circular dependency: A → S → X → A");
    }

    #[test]
    fn dead_end_branches_are_backtracked() {
        let g = graph(&[("S", "D1"), ("D1", "D2"), ("S", "Y"), ("Y", "A")]);
        let DependencyError::CircularDependency { path: p } = check(&g, "A", "S").unwrap_err()
        else {
            panic!("expected cycle");
        };
        assert_eq!(p, path(&["A", "S", "Y", "A"]));
    }

    #[test]
    fn unrelated_and_forward_edges_are_allowed() {
        let g = graph(&[("A", "B"), ("B", "C")]);
        assert!(check(&g, "A", "C").is_ok(), "transitive shortcut is not a cycle");
        assert!(check(&g, "D", "A").is_ok());
        assert!(check(&g, "C", "D").is_ok());
    }

    #[test]
    fn relates_to_edges_are_ignored_by_search() {
        let g = graph_typed(&[("A", "B", DependencyType::RelatesTo)]);
        assert!(check(&g, "B", "A").is_ok());

        let g = graph(&[("A", "B")]);
        assert!(
            CycleGuard::new(&g)
                .check(&"B".into(), &"A".into(), DependencyType::RelatesTo)
                .is_ok()
        );
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let g = graph(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]);
        assert!(check(&g, "A", "D").is_ok());
        assert!(!has_cycles(&g));
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let ids: Vec<String> = (0..20_000).map(|i| format!("t{i}")).collect();
        let pairs: Vec<(&str, &str)> = ids
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        let g = graph(&pairs);
        let err = check(&g, "t19999", "t0").unwrap_err();
        let DependencyError::CircularDependency { path: p } = err else {
            panic!("expected cycle");
        };
        assert_eq!(p.len(), 20_001);
    }

    #[test]
    fn would_create_cycle_wrapper() {
        let g = graph(&[("A", "B")]);
        assert_eq!(
            would_create_cycle(&g, &"B".into(), &"A".into()),
            Some(path(&["B", "A", "B"]))
        );
        assert_eq!(would_create_cycle(&g, &"A".into(), &"C".into()), None);
        assert_eq!(
            would_create_cycle(&g, &"A".into(), &"A".into()),
            Some(path(&["A", "A"]))
        );
    }

    #[test]
    fn find_cycles_reports_components() {
        // Stored graphs can be cyclic when edited outside the engine.
        let g = graph(&[("A", "B"), ("B", "A"), ("C", "D"), ("D", "E"), ("E", "C"), ("F", "A")]);
        assert!(has_cycles(&g));

        let reports = find_cycles(&g);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].members, path(&["A", "B"]));
        assert_eq!(reports[1].members, path(&["C", "D", "E"]));
    }
}
