//! Non-replicated in-memory directed graph.
//!
//! This is the materialized view that [`ReplicatedGraph`] keeps for reads.
//! It knows nothing about timestamps or merging.
//!
//! ## Submodules
//!
//! - [`directed`]: nodes, edges and structural mutation.
//! - [`path`]: reachability search over outgoing edges.
//!
//! [`ReplicatedGraph`]: crate::replicated::ReplicatedGraph

pub mod directed;
pub mod path;

pub use directed::{Detached, DirectedGraph, Edge, Node};
