use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use elgraph_core::{
    Clock, DirectedGraph, ElementId, GraphState, ManualClock, ReplicaId, ReplicatedGraph,
};

use crate::replica::{ReplicaIndex, ReplicaSnapshot};
use crate::rng::DeterministicRng;

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Fold another result into this one (failures accumulate).
    #[must_use]
    fn and(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two replicas ended with different graphs or sets.
    Convergence {
        replica_a: ReplicaIndex,
        replica_b: ReplicaIndex,
        /// Nodes visible on `replica_a` only.
        only_in_a: Vec<ElementId>,
        /// Nodes visible on `replica_b` only.
        only_in_b: Vec<ElementId>,
        /// Whether the sets differ even if the graphs agree.
        state_differs: bool,
    },

    /// Merging a replica's own state into it changed something.
    Idempotence {
        replica: ReplicaIndex,
        graph_changed: bool,
        state_changed: bool,
    },

    /// Merging the final states in a shuffled order gave a different graph.
    Commutativity {
        permutation_index: usize,
        canonical_nodes: usize,
        shuffled_nodes: usize,
        canonical_edges: usize,
        shuffled_edges: usize,
    },

    /// A replica's graph is not what its sets regenerate to.
    Derivability {
        replica: ReplicaIndex,
        nodes: usize,
        expected_nodes: usize,
        edges: usize,
        expected_edges: usize,
    },

    /// A graph holds an edge whose endpoint is missing.
    DanglingEdge {
        replica: ReplicaIndex,
        edge: ElementId,
    },
}

/// Summary of whether all replicas agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub converged: bool,
    /// Replicas whose graph differs from replica 0's.
    pub divergent_replicas: Vec<ReplicaIndex>,
    pub canonical_node_count: usize,
    pub canonical_edge_count: usize,
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks CRDT invariants over the final replica snapshots.
///
/// # Invariants checked
///
/// 1. **Convergence**: every replica holds the same graph and sets.
/// 2. **Idempotence**: merging a replica's own state is a no-op.
/// 3. **Commutativity**: merging all final states in any order into a fresh
///    replica yields the same graph.
/// 4. **Derivability**: each graph equals a regeneration of its sets.
/// 5. **No dangling edges**: every edge's endpoints are present.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Compare every snapshot's graph against the first one.
    #[must_use]
    pub fn evaluate(snapshots: &[ReplicaSnapshot]) -> ConvergenceReport {
        let Some(canonical) = snapshots.first() else {
            return ConvergenceReport {
                converged: true,
                divergent_replicas: Vec::new(),
                canonical_node_count: 0,
                canonical_edge_count: 0,
            };
        };

        let divergent_replicas: Vec<ReplicaIndex> = snapshots
            .iter()
            .filter(|snapshot| snapshot.graph != canonical.graph)
            .map(|snapshot| snapshot.index)
            .collect();

        ConvergenceReport {
            converged: divergent_replicas.is_empty(),
            divergent_replicas,
            canonical_node_count: canonical.graph.node_count(),
            canonical_edge_count: canonical.graph.edge_count(),
        }
    }

    // ── Invariant 1: Convergence ─────────────────────────────────────────────

    /// Compare every pair of replicas, reporting each diverging pair.
    #[must_use]
    pub fn check_convergence(snapshots: &[ReplicaSnapshot]) -> OracleResult {
        let mut violations = Vec::new();

        for (i, a) in snapshots.iter().enumerate() {
            for b in &snapshots[i + 1..] {
                let state_differs = a.state != b.state;
                if a.graph == b.graph && !state_differs {
                    continue;
                }

                let nodes_a = node_ids(&a.graph);
                let nodes_b = node_ids(&b.graph);
                violations.push(InvariantViolation::Convergence {
                    replica_a: a.index,
                    replica_b: b.index,
                    only_in_a: nodes_a.difference(&nodes_b).copied().collect(),
                    only_in_b: nodes_b.difference(&nodes_a).copied().collect(),
                    state_differs,
                });
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 2: Idempotence ─────────────────────────────────────────────

    /// Merge each replica's state back into a copy of itself.
    #[must_use]
    pub fn check_idempotence(snapshots: &[ReplicaSnapshot]) -> OracleResult {
        let violations = snapshots
            .iter()
            .filter_map(|snapshot| {
                let mut replica = ReplicatedGraph::from_state(
                    snapshot.state.clone(),
                    observer_clock(&snapshot.state),
                );
                replica.merge_state(&snapshot.state);

                let graph_changed = replica.graph() != &snapshot.graph;
                let state_changed = replica.state() != snapshot.state;
                (graph_changed || state_changed).then_some(InvariantViolation::Idempotence {
                    replica: snapshot.index,
                    graph_changed,
                    state_changed,
                })
            })
            .collect();

        OracleResult::from_violations(violations)
    }

    // ── Invariant 3: Commutativity ───────────────────────────────────────────

    /// Merge all states into a fresh replica in `iterations` shuffled orders
    /// and compare against the in-order result.
    #[must_use]
    pub fn check_commutativity(
        snapshots: &[ReplicaSnapshot],
        rng: &mut DeterministicRng,
        iterations: usize,
    ) -> OracleResult {
        if snapshots.len() < 2 || iterations == 0 {
            return OracleResult::pass();
        }

        let states: Vec<&GraphState> = snapshots.iter().map(|snapshot| &snapshot.state).collect();
        let canonical = merge_all(&states);

        let mut violations = Vec::new();
        for permutation_index in 0..iterations {
            let mut shuffled = states.clone();
            rng.shuffle(&mut shuffled);
            let result = merge_all(&shuffled);

            if result != canonical {
                violations.push(InvariantViolation::Commutativity {
                    permutation_index,
                    canonical_nodes: canonical.node_count(),
                    shuffled_nodes: result.node_count(),
                    canonical_edges: canonical.edge_count(),
                    shuffled_edges: result.edge_count(),
                });
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 4: Derivability ────────────────────────────────────────────

    /// Each replica's graph must equal a fresh regeneration of its sets.
    #[must_use]
    pub fn check_derivability(snapshots: &[ReplicaSnapshot]) -> OracleResult {
        let violations = snapshots
            .iter()
            .filter_map(|snapshot| {
                let expected = snapshot.state.materialize();
                (expected != snapshot.graph).then(|| InvariantViolation::Derivability {
                    replica: snapshot.index,
                    nodes: snapshot.graph.node_count(),
                    expected_nodes: expected.node_count(),
                    edges: snapshot.graph.edge_count(),
                    expected_edges: expected.edge_count(),
                })
            })
            .collect();

        OracleResult::from_violations(violations)
    }

    // ── Invariant 5: No dangling edges ───────────────────────────────────────

    #[must_use]
    pub fn check_edges_attached(snapshots: &[ReplicaSnapshot]) -> OracleResult {
        let mut violations = Vec::new();
        for snapshot in snapshots {
            for edge in snapshot.graph.edges() {
                let attached = snapshot.graph.node_exists(&edge.from)
                    && snapshot.graph.node_exists(&edge.to);
                if !attached {
                    violations.push(InvariantViolation::DanglingEdge {
                        replica: snapshot.index,
                        edge: edge.id,
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    // ── Composite runner ─────────────────────────────────────────────────────

    /// Run every check; `rng` drives the commutativity permutations.
    #[must_use]
    pub fn check_all(snapshots: &[ReplicaSnapshot], rng: &mut DeterministicRng) -> OracleResult {
        Self::check_convergence(snapshots)
            .and(Self::check_idempotence(snapshots))
            .and(Self::check_commutativity(snapshots, rng, 8))
            .and(Self::check_derivability(snapshots))
            .and(Self::check_edges_attached(snapshots))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn node_ids(graph: &DirectedGraph) -> BTreeSet<ElementId> {
    graph.nodes().map(elgraph_core::Node::id).collect()
}

/// Clock for a throwaway replica that only merges. It sits at the latest
/// stamp in `state` so skew checks have a sensible reference.
fn observer_clock(state: &GraphState) -> ManualClock {
    let latest = state
        .nodes
        .add_set()
        .values()
        .chain(state.nodes.remove_set().values())
        .map(|entry| entry.timestamp.wall)
        .chain(
            state
                .edges
                .add_set()
                .values()
                .chain(state.edges.remove_set().values())
                .map(|entry| entry.timestamp.wall),
        )
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    ManualClock::new(ReplicaId(0), latest)
}

fn merge_all(states: &[&GraphState]) -> DirectedGraph {
    let latest = states
        .iter()
        .map(|state| observer_clock(state).wall())
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let mut replica = ReplicatedGraph::with_clock(ManualClock::new(ReplicaId(0), latest));
    for state in states {
        replica.merge_state(state);
    }
    replica.graph().clone()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
