#![no_main]

use chrono::{DateTime, Duration, Utc};
use elgraph_core::{Edge, ElementId, ManualClock, Node, ReplicaId, ReplicatedGraph};
use libfuzzer_sys::fuzz_target;

fn node_id(byte: u8) -> ElementId {
    ElementId::from_u128(u128::from(byte % 8) + 1)
}

fn edge(from: u8, to: u8) -> Edge {
    let (from, to) = (node_id(from), node_id(to));
    let id = ElementId::from_u128(0x100 + (from.as_uuid().as_u128() << 4) + to.as_uuid().as_u128());
    Edge::new(id, from, to)
}

fn apply(graph: &mut ReplicatedGraph<ManualClock>, op: &[u8]) {
    let [kind, a, b] = *op else {
        return;
    };
    match kind % 6 {
        0 => {
            graph.add_node(Node::new(node_id(a), vec![b]));
        }
        1 => {
            graph.add_edge(edge(a, b));
        }
        2 => {
            graph.remove_node(&node_id(a));
        }
        3 => {
            graph.remove_edge(&edge(a, b));
        }
        4 => {
            graph.clock_mut().advance(Duration::microseconds(i64::from(a) * 256 + i64::from(b)));
        }
        _ => {
            let _ = graph.find_path(&node_id(a), &node_id(b));
        }
    }
}

// Each 4-byte chunk is one operation; its first byte picks the replica.
fuzz_target!(|data: &[u8]| {
    let start = DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000);
    let mut replicas = [1, 2, 3].map(|n| ReplicatedGraph::with_clock(ManualClock::new(ReplicaId(n), start)));

    for chunk in data.chunks_exact(4) {
        let target = usize::from(chunk[0] % 4);
        if target == 3 {
            // Gossip: one replica pulls the full state of its right neighbour.
            let to = usize::from(chunk[1] % 3);
            let from = (to + 1) % 3;
            let state = replicas[from].state();
            replicas[to].merge_state(&state);
        } else {
            apply(&mut replicas[target], &chunk[1..]);
        }
    }

    let [a, b, c] = &replicas;
    let mut ab_c = a.clone();
    ab_c.merge(b);
    ab_c.merge(c);
    let mut c_ba = c.clone();
    c_ba.merge(b);
    c_ba.merge(a);

    assert_eq!(ab_c.state(), c_ba.state());
    assert_eq!(ab_c.graph(), c_ba.graph());
    assert_eq!(ab_c.graph(), &ab_c.state().materialize());
    for e in ab_c.graph().edges() {
        assert!(ab_c.node_exists(&e.from) && ab_c.node_exists(&e.to));
    }
});
