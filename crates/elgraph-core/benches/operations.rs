use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use elgraph_core::{Edge, ElementId, ManualClock, Node, ReplicaId, ReplicatedGraph};

const TIERS: [(&str, u128); 3] = [("small", 100), ("medium", 1_000), ("large", 10_000)];

fn id(n: u128) -> ElementId {
    ElementId::from_u128(n)
}

/// A chain `0 -> 1 -> ... -> size-1` plus a back edge every tenth node.
fn build_replica(replica: u64, size: u128) -> ReplicatedGraph<ManualClock> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    let mut graph = ReplicatedGraph::with_clock(ManualClock::new(ReplicaId(replica), start));
    for n in 0..size {
        graph.add_node(Node::new(id(n), n.to_le_bytes().to_vec()));
    }
    for n in 0..size.saturating_sub(1) {
        graph.add_edge(Edge::new(id(size + n), id(n), id(n + 1)));
        if n % 10 == 9 {
            graph.add_edge(Edge::new(id(3 * size + n), id(n), id(n - 9)));
        }
    }
    graph
}

fn bench_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("operations.tiered");

    for (name, size) in TIERS {
        group.throughput(Throughput::Elements(u64::try_from(size).unwrap_or(u64::MAX)));

        group.bench_with_input(BenchmarkId::new("build", name), &size, |b, &size| {
            b.iter(|| black_box(build_replica(1, size)));
        });

        let left = build_replica(1, size);
        let mut right = build_replica(2, size);
        for n in (0..size).step_by(7) {
            right.remove_node(&id(n));
        }

        group.bench_with_input(
            BenchmarkId::new("merge", name),
            &(left.clone(), right.state()),
            |b, (left, remote)| {
                b.iter(|| {
                    let mut target = left.clone();
                    target.merge_state(remote);
                    black_box(target.graph().edge_count())
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("regenerate", name), &left, |b, left| {
            b.iter(|| black_box(left.state().materialize()));
        });

        group.bench_with_input(BenchmarkId::new("find_path", name), &left, |b, left| {
            b.iter(|| black_box(left.find_path(&id(0), &id(size - 1))));
        });

        let json = left.state().to_json().unwrap_or_default();
        group.bench_with_input(BenchmarkId::new("decode_state", name), &json, |b, json| {
            b.iter(|| black_box(elgraph_core::GraphState::from_json(json).is_ok()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_operations);
criterion_main!(benches);
