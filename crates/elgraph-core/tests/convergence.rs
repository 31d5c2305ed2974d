//! Multi-replica scenarios for the replicated graph.

use chrono::{DateTime, Duration, TimeZone, Utc};
use elgraph_core::{
    Clock, Edge, ElementId, ManualClock, Node, ReplicaId, ReplicatedGraph, Timestamp, TwoPhaseSet,
};

type Replica = ReplicatedGraph<ManualClock>;

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .expect("valid epoch")
}

/// Replica `n` whose clock starts `offset_secs` after the epoch.
fn replica_at(n: u64, offset_secs: i64) -> Replica {
    ReplicatedGraph::with_clock(ManualClock::new(
        ReplicaId(n),
        epoch() + Duration::seconds(offset_secs),
    ))
}

fn id(n: u128) -> ElementId {
    ElementId::from_u128(n)
}

fn node(n: u128, payload: &str) -> Node {
    Node::new(id(n), payload.as_bytes())
}

fn payload_of(g: &Replica, n: u128) -> Option<Vec<u8>> {
    g.get_node(&id(n)).map(|node| node.payload().to_vec())
}

fn merged(a: &Replica, b: &Replica) -> Replica {
    let mut out = a.clone();
    out.merge(b);
    out
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn repeated_add_node_keeps_first_record() {
    let mut g = replica_at(1, 0);
    assert!(g.add_node(node(1, "first")));
    let record = g.node_record(&id(1)).cloned();

    assert!(!g.add_node(node(1, "first")));
    assert!(!g.add_node(node(1, "second")));

    assert_eq!(g.node_record(&id(1)).cloned(), record);
    assert_eq!(g.graph().node_count(), 1);
    assert_eq!(payload_of(&g, 1).as_deref(), Some(&b"first"[..]));
}

#[test]
fn merging_snapshot_of_self_changes_nothing() {
    let mut g = replica_at(1, 0);
    g.add_node(node(1, "a"));
    g.add_node(node(2, "b"));
    g.add_node(node(3, "c"));
    g.add_edge(Edge::new(id(10), id(1), id(2)));
    g.add_edge(Edge::new(id(11), id(2), id(3)));
    g.remove_edge(&Edge::new(id(11), id(2), id(3)));
    g.remove_node(&id(3));

    let snapshot = g.clone();
    let before_state = g.state();
    let before_graph = g.graph().clone();

    g.merge(&snapshot);
    g.merge(&snapshot);
    assert_eq!(g.state(), before_state);
    assert_eq!(g.graph(), &before_graph);
}

#[test]
fn merging_subsumed_replica_changes_nothing() {
    let mut a = replica_at(1, 0);
    a.add_node(node(1, "a"));
    let b = a.clone();

    a.add_node(node(2, "b"));
    a.add_edge(Edge::new(id(10), id(1), id(2)));
    let before = a.state();

    a.merge(&b);
    assert_eq!(a.state(), before);
    assert!(a.edge_exists(&Edge::new(id(10), id(1), id(2))));
}

// ---------------------------------------------------------------------------
// Commutativity and associativity
// ---------------------------------------------------------------------------

#[test]
fn merge_order_does_not_matter_for_two_replicas() {
    let mut g1 = replica_at(1, 0);
    let mut g2 = replica_at(2, 0);

    g1.add_node(node(1, "one"));
    g1.add_node(node(2, "two"));
    g1.add_edge(Edge::new(id(10), id(1), id(2)));

    g2.add_node(node(2, "deux"));
    g2.add_node(node(3, "trois"));
    g2.add_edge(Edge::new(id(11), id(2), id(3)));
    g2.remove_node(&id(3));

    let ab = merged(&g1, &g2);
    let ba = merged(&g2, &g1);
    assert_eq!(ab.graph(), ba.graph());
    assert_eq!(ab.state(), ba.state());
    assert!(ab.edge_exists(&Edge::new(id(10), id(1), id(2))));
    assert!(!ab.node_exists(&id(3)));
}

#[test]
fn exact_wall_tie_resolved_by_replica_id_in_both_directions() {
    let mut g1 = replica_at(1, 0);
    let mut g2 = replica_at(2, 0);
    g1.add_node(node(1, "from-one"));
    g2.add_node(node(1, "from-two"));
    assert_eq!(
        g1.node_record(&id(1)).map(|r| r.timestamp.wall),
        g2.node_record(&id(1)).map(|r| r.timestamp.wall)
    );

    let ab = merged(&g1, &g2);
    let ba = merged(&g2, &g1);
    assert_eq!(payload_of(&ab, 1).as_deref(), Some(&b"from-two"[..]));
    assert_eq!(payload_of(&ba, 1).as_deref(), Some(&b"from-two"[..]));
}

#[test]
fn merge_grouping_does_not_matter() {
    let mut g1 = replica_at(1, 0);
    let mut g2 = replica_at(2, 1);
    let mut g3 = replica_at(3, 2);

    g1.add_node(node(1, "a"));
    g1.add_node(node(2, "b"));
    g1.add_edge(Edge::new(id(10), id(1), id(2)));

    g2.merge(&g1);
    g2.remove_edge(&Edge::new(id(10), id(1), id(2)));
    g2.add_node(node(3, "c"));

    g3.add_node(node(2, "b-later"));
    g3.add_node(node(4, "d"));

    let left = merged(&merged(&g1, &g2), &g3);
    let right = merged(&g1, &merged(&g2, &g3));
    assert_eq!(left.graph(), right.graph());
    assert_eq!(left.state(), right.state());
    assert_eq!(payload_of(&left, 2).as_deref(), Some(&b"b-later"[..]));
    assert!(!left.edge_exists(&Edge::new(id(10), id(1), id(2))));
}

// ---------------------------------------------------------------------------
// Tombstones and resurrection
// ---------------------------------------------------------------------------

#[test]
fn later_tombstone_hides_node_on_other_replicas() {
    let mut origin = replica_at(1, 0);
    origin.add_node(node(1, "x"));
    origin.remove_node(&id(1));

    let mut other = replica_at(2, 0);
    other.merge(&origin);
    assert!(!other.node_exists(&id(1)));
    assert!(other.node_set().add_set().contains_key(&id(1)));
    assert!(other.node_set().remove_set().contains_key(&id(1)));
}

#[test]
fn tombstone_propagates_after_node_was_already_shared() {
    let mut a = replica_at(1, 0);
    let mut b = replica_at(2, 0);
    a.add_node(node(1, "x"));
    b.merge(&a);
    assert!(b.node_exists(&id(1)));

    a.remove_node(&id(1));
    b.merge(&a);
    assert!(!b.node_exists(&id(1)));
}

#[test]
fn local_re_add_resurrects_with_new_payload() {
    let mut g = replica_at(1, 0);
    g.add_node(node(1, "t1"));
    g.remove_node(&id(1));
    assert!(!g.node_exists(&id(1)));

    assert!(g.add_node(node(1, "t3")));
    assert_eq!(payload_of(&g, 1).as_deref(), Some(&b"t3"[..]));

    g.regenerate();
    assert_eq!(payload_of(&g, 1).as_deref(), Some(&b"t3"[..]));

    let mut other = replica_at(2, 0);
    other.merge(&g);
    assert_eq!(payload_of(&other, 1).as_deref(), Some(&b"t3"[..]));
}

#[test]
fn merged_re_add_resurrects_with_new_payload() {
    let mut a = replica_at(1, 0);
    a.add_node(node(1, "t1"));
    a.remove_node(&id(1));

    let mut b = replica_at(2, 10);
    b.add_node(node(1, "t3"));

    a.merge(&b);
    assert_eq!(payload_of(&a, 1).as_deref(), Some(&b"t3"[..]));
}

#[test]
fn stale_re_add_stays_hidden() {
    let mut a = replica_at(1, 10);
    a.add_node(node(1, "t1"));
    a.remove_node(&id(1));

    // Replica 2's clock reads earlier than the removal.
    let mut b = replica_at(2, 0);
    b.add_node(node(1, "stale"));

    a.merge(&b);
    assert!(!a.node_exists(&id(1)));
}

#[test]
fn add_wins_on_equal_timestamps() {
    let stamp = Timestamp::new(epoch(), ReplicaId(1));
    let mut set: TwoPhaseSet<Vec<u8>> = TwoPhaseSet::new();
    set.add(id(1), b"x".to_vec(), stamp);
    set.remove(id(1), stamp).expect("observed");
    assert!(set.contains(&id(1)));

    let clock = ManualClock::new(ReplicaId(1), epoch()).with_step(Duration::zero());
    let mut frozen = ReplicatedGraph::with_clock(clock);
    frozen.add_node(node(1, "x"));
    assert!(frozen.remove_node(&id(1)));
    assert!(!frozen.node_exists(&id(1)));

    frozen.regenerate();
    assert!(frozen.node_exists(&id(1)));
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[test]
fn removing_endpoint_drops_edge_without_edge_tombstone() {
    let mut g = replica_at(1, 0);
    g.add_node(node(1, "a"));
    g.add_node(node(2, "b"));
    let edge = Edge::new(id(10), id(1), id(2));
    g.add_edge(edge);

    assert!(g.remove_node(&id(1)));
    assert!(!g.node_exists(&id(1)));
    assert!(!g.edge_exists(&edge));
    assert!(g.edge_set().remove_set().is_empty());

    g.regenerate();
    assert!(!g.edge_exists(&edge));

    let mut other = replica_at(2, 0);
    other.merge(&g);
    assert!(other.node_exists(&id(2)));
    assert!(!other.edge_exists(&edge));
}

#[test]
fn cascaded_edge_returns_when_endpoint_is_resurrected() {
    let mut g = replica_at(1, 0);
    g.add_node(node(1, "a"));
    g.add_node(node(2, "b"));
    let edge = Edge::new(id(10), id(1), id(2));
    g.add_edge(edge);
    g.remove_node(&id(2));
    g.add_node(node(2, "b again"));
    assert!(!g.edge_exists(&edge));

    g.regenerate();
    assert!(g.edge_exists(&edge));
}

#[test]
fn edge_to_missing_endpoint_is_rejected() {
    let mut g = replica_at(1, 0);
    g.add_node(node(1, "a"));

    assert!(!g.add_edge(Edge::new(id(10), id(1), id(2))));
    assert!(!g.add_edge(Edge::new(id(11), id(2), id(1))));
    assert!(g.edge_set().add_set().is_empty());
}

#[test]
fn concurrent_edge_and_endpoint_removal_converge() {
    let mut a = replica_at(1, 0);
    a.add_node(node(1, "a"));
    a.add_node(node(2, "b"));

    let mut b = replica_at(2, 1);
    b.merge(&a);

    let edge = Edge::new(id(10), id(1), id(2));
    assert!(a.add_edge(edge));
    assert!(b.remove_node(&id(2)));

    let ab = merged(&a, &b);
    let ba = merged(&b, &a);
    assert_eq!(ab.graph(), ba.graph());
    assert!(!ab.edge_exists(&edge));
    assert!(ab.edge_set().contains(&id(10)));
}

#[test]
fn removed_edge_stays_removed_after_merge() {
    let mut a = replica_at(1, 0);
    a.add_node(node(1, "a"));
    a.add_node(node(2, "b"));
    let edge = Edge::new(id(10), id(1), id(2));
    a.add_edge(edge);

    let mut b = replica_at(2, 5);
    b.merge(&a);
    assert!(b.remove_edge(&edge));

    a.merge(&b);
    assert!(!a.edge_exists(&edge));
    assert!(a.node_exists(&id(1)));
    assert!(a.node_exists(&id(2)));
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn path_search_escapes_cycle() {
    let mut g = replica_at(1, 0);
    for n in 1..=4 {
        g.add_node(node(n, ""));
    }
    g.add_edge(Edge::new(id(10), id(1), id(2)));
    g.add_edge(Edge::new(id(11), id(2), id(3)));
    g.add_edge(Edge::new(id(12), id(3), id(2)));
    g.add_edge(Edge::new(id(13), id(1), id(4)));

    assert_eq!(g.find_path(&id(1), &id(4)), vec![id(1), id(4)]);
    assert!(g.find_path(&id(2), &id(4)).is_empty());
}

#[test]
fn path_follows_merged_edges() {
    let mut a = replica_at(1, 0);
    a.add_node(node(1, ""));
    a.add_node(node(2, ""));
    a.add_edge(Edge::new(id(10), id(1), id(2)));

    let mut b = replica_at(2, 0);
    b.merge(&a);
    b.add_node(node(3, ""));
    b.add_edge(Edge::new(id(11), id(2), id(3)));

    a.merge(&b);
    assert_eq!(a.find_path(&id(1), &id(3)), vec![id(1), id(2), id(3)]);
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[test]
fn later_payload_wins_across_replicas() {
    let mut r1 = replica_at(1, 0);
    let mut r2 = replica_at(2, 60);

    r1.add_node(node(1, "hello"));
    r2.add_node(node(1, "world"));
    assert!(
        r2.node_record(&id(1)).map(|r| r.timestamp)
            > r1.node_record(&id(1)).map(|r| r.timestamp)
    );

    r1.merge(&r2);
    assert_eq!(payload_of(&r1, 1).as_deref(), Some(&b"world"[..]));

    r2.merge(&r1);
    assert_eq!(payload_of(&r2, 1).as_deref(), Some(&b"world"[..]));
}

#[test]
fn gossip_ring_converges() {
    let mut replicas: Vec<Replica> = (0..4).map(|n| replica_at(n + 1, 0)).collect();
    for (i, g) in replicas.iter_mut().enumerate() {
        let base = u128::try_from(i).expect("small index") * 10;
        g.add_node(node(base + 1, "x"));
        g.add_node(node(base + 2, "y"));
        g.add_edge(Edge::new(id(base + 100), id(base + 1), id(base + 2)));
        g.clock_mut().advance(Duration::seconds(1));
    }

    // Two rounds around the ring reach every replica.
    for _ in 0..2 {
        for i in 0..replicas.len() {
            let next = (i + 1) % replicas.len();
            let state = replicas[i].state();
            replicas[next].merge_state(&state);
        }
    }

    let first = replicas[0].graph().clone();
    assert_eq!(first.node_count(), 8);
    assert_eq!(first.edge_count(), 4);
    for g in &replicas[1..] {
        assert_eq!(g.graph(), &first);
    }
}

#[test]
fn system_clock_replicas_converge() {
    let mut a = ReplicatedGraph::new();
    let mut b = ReplicatedGraph::new();
    a.add_node(node(1, "a"));
    b.add_node(node(2, "b"));
    assert_ne!(a.replica(), b.replica());

    let ab = merged_system(&a, &b);
    let ba = merged_system(&b, &a);
    assert_eq!(ab.graph(), ba.graph());
    assert_eq!(ab.graph().node_count(), 2);

    let mut probe = ab;
    let first = probe.clock_mut().now();
    let second = probe.clock_mut().now();
    assert!(second.is_after(&first));
}

fn merged_system(a: &ReplicatedGraph, b: &ReplicatedGraph) -> ReplicatedGraph {
    let mut out = a.clone();
    out.merge(b);
    out
}
