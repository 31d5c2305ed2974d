//! The replicated graph CRDT.
//!
//! A [`ReplicatedGraph`] holds two [`TwoPhaseSet`]s (nodes and edges) as the
//! source of truth and a [`DirectedGraph`] as a derived cache for reads.
//!
//! # Local mutations
//!
//! Each mutation is attempted on the cache first and recorded in the
//! matching set only if the cache accepted it. A removal whose tombstone
//! cannot be written (the set never saw the element added) is rolled back in
//! the cache, so the operation as a whole does not happen.
//!
//! # Merge
//!
//! Merging joins both sets and rebuilds the cache from scratch:
//!
//! 1. Materialize every node whose add entry survives its tombstone.
//! 2. Insert every surviving edge whose endpoints were materialized in (1).
//!
//! Nodes go in before edges because edge insertion needs both endpoints. An
//! edge that was never tombstoned still disappears if an endpoint did.
//!
//! # Concurrency
//!
//! Nothing here is synchronized. Callers sharing one replica across threads
//! must serialize every mutation and merge behind one lock.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::clock::skew::{ClockSkewWarning, DEFAULT_SKEW_THRESHOLD_SECS, check_clock_skew};
use crate::clock::{Clock, SystemClock};
use crate::config::ReplicaConfig;
use crate::crdt::merge::Merge;
use crate::crdt::two_phase::{Timestamped, TwoPhaseSet};
use crate::error::Error;
use crate::graph::{DirectedGraph, Edge, Node};
use crate::id::{ElementId, ReplicaId};

// ---------------------------------------------------------------------------
// GraphState
// ---------------------------------------------------------------------------

/// The mergeable part of a replica: everything another replica needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphState {
    /// Node ids mapped to node payloads.
    pub nodes: TwoPhaseSet<Vec<u8>>,
    /// Edge ids mapped to the edges themselves.
    pub edges: TwoPhaseSet<Edge>,
}

impl GraphState {
    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] if `raw` is not a valid encoded state.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Total number of add and remove entries across both sets.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.nodes.add_set().len()
            + self.nodes.remove_set().len()
            + self.edges.add_set().len()
            + self.edges.remove_set().len()
    }

    /// Rebuild a graph from this state.
    #[must_use]
    pub fn materialize(&self) -> DirectedGraph {
        let mut graph = DirectedGraph::new();
        for (id, added) in self.nodes.live() {
            graph.add_node(Node::new(*id, added.payload.clone()));
        }
        for (id, added) in self.edges.live() {
            // An edge filed under a foreign key has no tombstone of its own.
            if added.payload.id != *id {
                debug!(key = %id, edge = %added.payload.id, "skipping mis-keyed edge");
                continue;
            }
            graph.add_edge(added.payload);
        }
        graph
    }
}

impl Merge for GraphState {
    fn merge(&mut self, other: &Self) {
        self.nodes.merge(&other.nodes);
        self.edges.merge(&other.edges);
    }
}

// ---------------------------------------------------------------------------
// ReplicatedGraph
// ---------------------------------------------------------------------------

/// One replica of the graph.
#[derive(Debug, Clone)]
pub struct ReplicatedGraph<C = SystemClock> {
    state: GraphState,
    derived: DirectedGraph,
    clock: C,
    skew_threshold: Duration,
}

impl ReplicatedGraph<SystemClock> {
    /// Empty replica stamped by the system clock under a random replica id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::default())
    }

    /// Empty replica configured from a [`ReplicaConfig`].
    #[must_use]
    pub fn from_config(config: &ReplicaConfig) -> Self {
        Self::with_clock(SystemClock::new(config.replica()))
            .with_skew_threshold(config.skew_threshold())
    }
}

impl Default for ReplicatedGraph<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ReplicatedGraph<C> {
    /// Empty replica stamped by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: GraphState::default(),
            derived: DirectedGraph::new(),
            clock,
            skew_threshold: Duration::seconds(
                i64::try_from(DEFAULT_SKEW_THRESHOLD_SECS).unwrap_or(i64::MAX / 1000),
            ),
        }
    }

    /// Replica seeded from a previously exported state. The cache is
    /// regenerated immediately.
    pub fn from_state(state: GraphState, clock: C) -> Self {
        let mut graph = Self::with_clock(clock);
        graph.state = state;
        graph.regenerate();
        graph
    }

    /// Replace the distance from local wall time at which merged stamps are
    /// reported as skewed.
    #[must_use]
    pub fn with_skew_threshold(mut self, threshold: Duration) -> Self {
        self.skew_threshold = threshold;
        self
    }

    // --- mutations -------------------------------------------------------

    /// Add a node. Returns `false` if a node with this id is already in the
    /// local graph; the first payload observed locally is kept.
    pub fn add_node(&mut self, node: Node) -> bool {
        let id = node.id();
        let payload = node.payload().to_vec();
        if !self.derived.add_node(node) {
            trace!(node = %id, "add_node skipped: already present");
            return false;
        }
        let at = self.clock.now();
        self.state.nodes.add(id, payload, at);
        true
    }

    /// Add an edge. Returns `false` if the edge exists or either endpoint is
    /// missing from the local graph; nothing is recorded in that case.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.derived.add_edge(edge) {
            trace!(edge = %edge.id, "add_edge skipped");
            return false;
        }
        let at = self.clock.now();
        self.state.edges.add(edge.id, edge, at);
        true
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns `false` if the node is absent, or if the node set has no add
    /// entry to tombstone. In the latter case the node and its cascaded edges
    /// are restored and the graph is left exactly as it was.
    pub fn remove_node(&mut self, id: &ElementId) -> bool {
        let Some(detached) = self.derived.detach_node(id) else {
            return false;
        };
        let at = self.clock.now();
        match self.state.nodes.remove(*id, at) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    node = %id,
                    code = %err.code(),
                    hint = err.hint().unwrap_or_default(),
                    error = %err,
                    "rolling back node removal"
                );
                self.derived.restore(detached);
                false
            }
        }
    }

    /// Remove an edge. Returns `false` if it is absent, or if the edge set has
    /// no add entry to tombstone (the edge is then put back).
    pub fn remove_edge(&mut self, edge: &Edge) -> bool {
        let Some(stored) = self.derived.take_edge(edge) else {
            return false;
        };
        let at = self.clock.now();
        match self.state.edges.remove(stored.id, at) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    edge = %stored.id,
                    code = %err.code(),
                    hint = err.hint().unwrap_or_default(),
                    error = %err,
                    "rolling back edge removal"
                );
                self.derived.add_edge(stored);
                false
            }
        }
    }

    // --- reconciliation --------------------------------------------------

    /// Fold another replica into this one and regenerate the cache.
    pub fn merge<D: Clock>(&mut self, other: &ReplicatedGraph<D>) {
        self.merge_state(&other.state);
    }

    /// Fold an exported state into this replica and regenerate the cache.
    #[tracing::instrument(level = "debug", skip_all, fields(replica = %self.clock.replica()))]
    pub fn merge_state(&mut self, remote: &GraphState) {
        self.report_skew(remote);
        self.state.merge(remote);
        debug!(
            remote_entries = remote.entry_count(),
            local_entries = self.state.entry_count(),
            "merged remote state"
        );
        self.regenerate();
    }

    /// Rebuild the derived graph from the node and edge sets.
    #[tracing::instrument(level = "debug", skip_all, fields(replica = %self.clock.replica()))]
    pub fn regenerate(&mut self) {
        let rebuilt = self.state.materialize();
        debug!(
            nodes = rebuilt.node_count(),
            edges = rebuilt.edge_count(),
            live_edges = self.state.edges.len(),
            "regenerated derived graph"
        );
        self.derived = rebuilt;
    }

    fn report_skew(&self, remote: &GraphState) {
        let local_replica = self.clock.replica();
        let local_wall = self.clock.wall();

        let stamps = remote
            .nodes
            .add_set()
            .values()
            .chain(remote.nodes.remove_set().values())
            .map(|entry| entry.timestamp)
            .chain(
                remote
                    .edges
                    .add_set()
                    .values()
                    .chain(remote.edges.remove_set().values())
                    .map(|entry| entry.timestamp),
            )
            .filter(|stamp| stamp.replica != local_replica);

        let mut skewed = 0_usize;
        let mut worst: Option<ClockSkewWarning> = None;
        for stamp in stamps {
            let Some(warning) = check_clock_skew(stamp.wall, local_wall, self.skew_threshold)
            else {
                continue;
            };
            skewed += 1;
            let replace = worst
                .as_ref()
                .is_none_or(|w| warning.skew_millis.abs() > w.skew_millis.abs());
            if replace {
                worst = Some(warning);
            }
        }

        if let Some(worst) = worst {
            warn!(
                skewed_entries = skewed,
                worst_skew_ms = worst.skew_millis,
                "{}",
                worst.message
            );
        }
    }

    // --- queries ---------------------------------------------------------

    /// The derived graph.
    #[must_use]
    pub const fn graph(&self) -> &DirectedGraph {
        &self.derived
    }

    /// The node set (payloads keyed by node id).
    #[must_use]
    pub const fn node_set(&self) -> &TwoPhaseSet<Vec<u8>> {
        &self.state.nodes
    }

    /// The edge set.
    #[must_use]
    pub const fn edge_set(&self) -> &TwoPhaseSet<Edge> {
        &self.state.edges
    }

    /// Copy of the mergeable state, for sending to other replicas.
    #[must_use]
    pub fn state(&self) -> GraphState {
        self.state.clone()
    }

    #[must_use]
    pub fn replica(&self) -> ReplicaId {
        self.clock.replica()
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    #[must_use]
    pub fn node_exists(&self, id: &ElementId) -> bool {
        self.derived.node_exists(id)
    }

    #[must_use]
    pub fn edge_exists(&self, edge: &Edge) -> bool {
        self.derived.edge_exists(edge)
    }

    #[must_use]
    pub fn get_node(&self, id: &ElementId) -> Option<&Node> {
        self.derived.get_node(id)
    }

    #[must_use]
    pub fn find_path(&self, start: &ElementId, end: &ElementId) -> Vec<ElementId> {
        self.derived.find_path(start, end)
    }

    /// Add entry for a node id, if any.
    #[must_use]
    pub fn node_record(&self, id: &ElementId) -> Option<&Timestamped<Vec<u8>>> {
        self.state.nodes.add_set().get(id)
    }
}

impl<C: Clock> Merge for ReplicatedGraph<C> {
    fn merge(&mut self, other: &Self) {
        self.merge_state(&other.state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
