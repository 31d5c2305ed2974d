use chrono::{DateTime, Utc};
use elgraph_core::{
    Clock, DirectedGraph, Edge, ElementId, GraphState, ManualClock, Node, ReplicaId,
    ReplicatedGraph,
};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Position of a replica in the simulation.
pub type ReplicaIndex = usize;

const EDGE_ID_BASE: u128 = 1 << 64;

/// Node id drawn from a small shared space so replicas collide.
#[must_use]
pub fn node_id(n: u64) -> ElementId {
    ElementId::from_u128(u128::from(n) + 1)
}

/// Edge ids are a function of their endpoints, so every replica that adds
/// `from -> to` names the same logical edge.
#[must_use]
pub fn edge_between(from: ElementId, to: ElementId) -> Edge {
    let (lo_from, lo_to) = (
        from.as_uuid().as_u128() & 0xFFFF_FFFF,
        to.as_uuid().as_u128() & 0xFFFF_FFFF,
    );
    let id = ElementId::from_u128(EDGE_ID_BASE + (lo_from << 32) + lo_to);
    Edge::new(id, from, to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    AddNode,
    AddEdge,
    RemoveNode,
    RemoveEdge,
    /// Add a node id this replica has seen removed.
    Readd,
}

/// One local mutation attempted during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub target: ElementId,
    /// Whether the replicated graph accepted it.
    pub applied: bool,
}

/// Final state of one replica, as inspected by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub index: ReplicaIndex,
    pub replica: ReplicaId,
    pub graph: DirectedGraph,
    pub state: GraphState,
}

/// A [`ReplicatedGraph`] driven by random mutations.
#[derive(Debug, Clone)]
pub struct SimulatedReplica {
    index: ReplicaIndex,
    graph: ReplicatedGraph<ManualClock>,
    node_space: u64,
    next_payload: u64,
}

impl SimulatedReplica {
    #[must_use]
    pub fn new(index: ReplicaIndex, node_space: u64, start: DateTime<Utc>) -> Self {
        let replica = ReplicaId(u64::try_from(index).unwrap_or(u64::MAX).saturating_add(1));
        Self {
            index,
            graph: ReplicatedGraph::with_clock(ManualClock::new(replica, start)),
            node_space: node_space.max(1),
            next_payload: 0,
        }
    }

    #[must_use]
    pub const fn index(&self) -> ReplicaIndex {
        self.index
    }

    #[must_use]
    pub const fn graph(&self) -> &ReplicatedGraph<ManualClock> {
        &self.graph
    }

    /// Move the replica's clock to its simulated wall reading, never
    /// backwards.
    pub fn sync_clock(&mut self, wall: DateTime<Utc>) {
        let clock = self.graph.clock_mut();
        if wall > clock.wall() {
            clock.set(wall);
        }
    }

    /// Attempt one random mutation.
    pub fn step(&mut self, rng: &mut DeterministicRng) -> Mutation {
        match rng.next_bounded(100) {
            0..35 => self.add_random_node(rng),
            35..65 => self.add_random_edge(rng),
            65..75 => self.remove_random_node(rng),
            75..85 => self.remove_random_edge(rng),
            _ => self.readd_removed_node(rng),
        }
    }

    pub fn receive(&mut self, state: &GraphState) {
        self.graph.merge_state(state);
    }

    #[must_use]
    pub fn state(&self) -> GraphState {
        self.graph.state()
    }

    #[must_use]
    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            index: self.index,
            replica: self.graph.replica(),
            graph: self.graph.graph().clone(),
            state: self.graph.state(),
        }
    }

    fn payload(&mut self) -> Vec<u8> {
        let payload = format!("{}:{}", self.graph.replica(), self.next_payload);
        self.next_payload += 1;
        payload.into_bytes()
    }

    fn random_node_id(&self, rng: &mut DeterministicRng) -> ElementId {
        node_id(rng.next_bounded(self.node_space))
    }

    /// A present node if there is one, else any id from the space.
    fn pick_node(&self, rng: &mut DeterministicRng) -> ElementId {
        let present: Vec<ElementId> = self.graph.graph().nodes().map(Node::id).collect();
        if present.is_empty() {
            self.random_node_id(rng)
        } else {
            present[rng.next_index(present.len())]
        }
    }

    fn add_random_node(&mut self, rng: &mut DeterministicRng) -> Mutation {
        let id = self.random_node_id(rng);
        let payload = self.payload();
        Mutation {
            kind: MutationKind::AddNode,
            target: id,
            applied: self.graph.add_node(Node::new(id, payload)),
        }
    }

    fn add_random_edge(&mut self, rng: &mut DeterministicRng) -> Mutation {
        let from = self.pick_node(rng);
        let to = self.pick_node(rng);
        let edge = edge_between(from, to);
        Mutation {
            kind: MutationKind::AddEdge,
            target: edge.id,
            applied: self.graph.add_edge(edge),
        }
    }

    fn remove_random_node(&mut self, rng: &mut DeterministicRng) -> Mutation {
        let id = self.pick_node(rng);
        Mutation {
            kind: MutationKind::RemoveNode,
            target: id,
            applied: self.graph.remove_node(&id),
        }
    }

    fn remove_random_edge(&mut self, rng: &mut DeterministicRng) -> Mutation {
        let edges: Vec<Edge> = self.graph.graph().edges().copied().collect();
        let edge = if edges.is_empty() {
            let from = self.random_node_id(rng);
            edge_between(from, self.random_node_id(rng))
        } else {
            edges[rng.next_index(edges.len())]
        };
        Mutation {
            kind: MutationKind::RemoveEdge,
            target: edge.id,
            applied: self.graph.remove_edge(&edge),
        }
    }

    fn readd_removed_node(&mut self, rng: &mut DeterministicRng) -> Mutation {
        let removed: Vec<ElementId> = self
            .graph
            .node_set()
            .remove_set()
            .keys()
            .filter(|id| !self.graph.node_exists(id))
            .copied()
            .collect();
        if removed.is_empty() {
            return self.add_random_node(rng);
        }
        let id = removed[rng.next_index(removed.len())];
        let payload = self.payload();
        Mutation {
            kind: MutationKind::Readd,
            target: id,
            applied: self.graph.add_node(Node::new(id, payload)),
        }
    }
}
