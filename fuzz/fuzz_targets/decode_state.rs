#![no_main]

use elgraph_core::GraphState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(state) = GraphState::from_json(raw) {
        // Any decodable state must regenerate to a graph without dangling edges.
        let graph = state.materialize();
        for edge in graph.edges() {
            assert!(graph.node_exists(&edge.from));
            assert!(graph.node_exists(&edge.to));
        }
        let encoded = state.to_json().expect("re-encode");
        assert_eq!(GraphState::from_json(&encoded).ok(), Some(state));
    }
});
