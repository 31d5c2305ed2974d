//! Replicated set primitives.
//!
//! - [`two_phase`]: the add-set/remove-set pair that records every node and
//!   edge operation, merged per key by timestamp.
//! - [`merge`]: the semilattice join trait shared by every mergeable type.

pub mod merge;
pub mod two_phase;
