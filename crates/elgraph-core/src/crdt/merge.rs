/// State-based join.
///
/// Implementations fold `other` into `self`. For every type in this crate
/// the join is associative and idempotent; it is commutative except when two
/// entries carry exactly equal timestamps, where the receiver keeps its own.
pub trait Merge {
    fn merge(&mut self, other: &Self);
}
