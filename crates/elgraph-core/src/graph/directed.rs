//! Nodes own their outgoing edges; edges refer to endpoints by id.
//!
//! # Invariant
//!
//! Every edge stored under a node has both endpoints present in the graph.
//! [`DirectedGraph::add_edge`] refuses edges with a missing endpoint and
//! [`DirectedGraph::remove_node`] drops every edge pointing at the removed
//! node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ElementId;

// ---------------------------------------------------------------------------
// Node / Edge
// ---------------------------------------------------------------------------

/// A directed edge between two nodes of the same graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: ElementId,
    pub from: ElementId,
    pub to: ElementId,
}

impl Edge {
    #[must_use]
    pub const fn new(id: ElementId, from: ElementId, to: ElementId) -> Self {
        Self { id, from, to }
    }

    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// A graph node: id, opaque payload, and its outgoing edges keyed by edge id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    id: ElementId,
    payload: Vec<u8>,
    edges: BTreeMap<ElementId, Edge>,
}

impl Node {
    /// Create a node with no outgoing edges.
    #[must_use]
    pub fn new(id: ElementId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
            edges: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Outgoing edges keyed by edge id.
    #[must_use]
    pub const fn edges(&self) -> &BTreeMap<ElementId, Edge> {
        &self.edges
    }
}

/// A node taken out of a graph together with the incoming edges its removal
/// cascaded away. [`DirectedGraph::restore`] puts all of it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub node: Node,
    pub incoming: Vec<Edge>,
}

// ---------------------------------------------------------------------------
// DirectedGraph
// ---------------------------------------------------------------------------

/// In-memory directed graph keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectedGraph {
    nodes: BTreeMap<ElementId, Node>,
}

impl DirectedGraph {
    /// Create an empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Insert a node. Returns `false` if a node with that id is present.
    ///
    /// Any outgoing edges the node carries are dropped; edges only enter the
    /// graph through [`add_edge`](Self::add_edge).
    pub fn add_node(&mut self, mut node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        node.edges.clear();
        self.nodes.insert(node.id, node);
        true
    }

    /// Remove a node, its outgoing edges, and every edge pointing at it.
    /// Returns `false` if the node is absent.
    pub fn remove_node(&mut self, id: &ElementId) -> bool {
        self.detach_node(id).is_some()
    }

    /// Remove a node like [`remove_node`](Self::remove_node) and hand back
    /// everything that was removed.
    pub fn detach_node(&mut self, id: &ElementId) -> Option<Detached> {
        let node = self.nodes.remove(id)?;

        let mut incoming = Vec::new();
        for other in self.nodes.values_mut() {
            other.edges.retain(|_, edge| {
                if edge.to == *id {
                    incoming.push(*edge);
                    false
                } else {
                    true
                }
            });
        }

        Some(Detached { node, incoming })
    }

    /// Re-insert a detached node with its own outgoing edges and the incoming
    /// edges that were cascaded away. Returns `false` (and changes nothing)
    /// if a node with that id is already present.
    ///
    /// Edges whose other endpoint has since disappeared are skipped.
    pub fn restore(&mut self, detached: Detached) -> bool {
        let Detached { mut node, incoming } = detached;
        if self.nodes.contains_key(&node.id) {
            return false;
        }

        let id = node.id;
        node.edges
            .retain(|_, edge| edge.to == id || self.nodes.contains_key(&edge.to));
        self.nodes.insert(id, node);

        for edge in incoming {
            if let Some(source) = self.nodes.get_mut(&edge.from) {
                source.edges.entry(edge.id).or_insert(edge);
            }
        }
        true
    }

    /// Insert an edge under its source node.
    ///
    /// Returns `false` if the edge id already exists under the source, or if
    /// either endpoint is absent.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if self.edge_exists(&edge) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        let Some(source) = self.nodes.get_mut(&edge.from) else {
            return false;
        };
        source.edges.insert(edge.id, edge);
        true
    }

    /// Remove an edge. Returns `false` if its source node is absent or the
    /// edge id is not stored under it.
    pub fn remove_edge(&mut self, edge: &Edge) -> bool {
        self.take_edge(edge).is_some()
    }

    /// Remove an edge and return the stored copy.
    pub fn take_edge(&mut self, edge: &Edge) -> Option<Edge> {
        self.nodes
            .get_mut(&edge.from)
            .and_then(|source| source.edges.remove(&edge.id))
    }

    #[must_use]
    pub fn node_exists(&self, id: &ElementId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Whether `edge.id` is stored under `edge.from`.
    #[must_use]
    pub fn edge_exists(&self, edge: &Edge) -> bool {
        self.nodes
            .get(&edge.from)
            .is_some_and(|source| source.edges.contains_key(&edge.id))
    }

    #[must_use]
    pub fn get_node(&self, id: &ElementId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn get_edge(&self, from: &ElementId, id: &ElementId) -> Option<&Edge> {
        self.nodes.get(from).and_then(|source| source.edges.get(id))
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// All edges, grouped by source node in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.nodes.values().flat_map(|node| node.edges.values())
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.edges.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Destination ids of the outgoing edges of `id` (empty if absent).
    #[must_use]
    pub fn successors(&self, id: &ElementId) -> Vec<ElementId> {
        self.nodes
            .get(id)
            .map(|node| node.edges.values().map(|edge| edge.to).collect())
            .unwrap_or_default()
    }

    /// Source ids of the edges pointing at `id`.
    #[must_use]
    pub fn predecessors(&self, id: &ElementId) -> Vec<ElementId> {
        self.edges()
            .filter(|edge| edge.to == *id)
            .map(|edge| edge.from)
            .collect()
    }
}
