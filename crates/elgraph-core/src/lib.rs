//! elgraph-core library.
//!
//! A replicated directed graph built from two two-phase sets (one for nodes,
//! one for edges) and a materialized [`graph::DirectedGraph`] cache that is
//! rebuilt from those sets after every merge.
//!
//! # Conventions
//!
//! - **Errors**: [`Error`] for library failures; `anyhow::Result` for
//!   configuration loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//!   The library never installs a subscriber.

pub mod clock;
pub mod config;
pub mod crdt;
pub mod error;
pub mod graph;
pub mod id;
pub mod replicated;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use crdt::merge::Merge;
pub use crdt::two_phase::{Timestamped, TwoPhaseSet};
pub use error::{Error, ErrorCode};
pub use graph::{DirectedGraph, Edge, Node};
pub use id::{ElementId, ReplicaId};
pub use replicated::{GraphState, ReplicatedGraph};
