//! Path search over outgoing edges.
//!
//! Depth-first with a visited set, so cycles that never reach the target
//! cannot keep the search going. Each node is expanded at most once: O(V+E).
//! The walk keeps an explicit stack rather than recursing, so long chains do
//! not grow the call stack.

use std::collections::HashSet;

use super::directed::{DirectedGraph, Edge};
use crate::id::ElementId;

impl DirectedGraph {
    /// First path found from `start` to `end`, both endpoints included.
    ///
    /// Returns `[start]` when `start == end`, and an empty vector when either
    /// endpoint is absent or `end` is unreachable. When several paths exist,
    /// which one is returned is unspecified.
    #[must_use]
    pub fn find_path(&self, start: &ElementId, end: &ElementId) -> Vec<ElementId> {
        let Some(start_node) = self.get_node(start) else {
            return Vec::new();
        };
        if !self.node_exists(end) {
            return Vec::new();
        }
        if start == end {
            return vec![*start];
        }

        let mut visited: HashSet<ElementId> = HashSet::from([*start]);
        let mut path = vec![*start];
        let mut frontier: Vec<std::collections::btree_map::Values<'_, ElementId, Edge>> =
            vec![start_node.edges().values()];

        while let Some(edges) = frontier.last_mut() {
            let Some(edge) = edges.next() else {
                frontier.pop();
                path.pop();
                continue;
            };

            if edge.to == *end {
                path.push(edge.to);
                return path;
            }
            if !visited.insert(edge.to) {
                continue;
            }
            if let Some(next) = self.get_node(&edge.to) {
                path.push(edge.to);
                frontier.push(next.edges().values());
            }
        }

        Vec::new()
    }

    /// Whether `end` is reachable from `start`.
    #[must_use]
    pub fn is_reachable(&self, start: &ElementId, end: &ElementId) -> bool {
        !self.find_path(start, end).is_empty()
    }
}
