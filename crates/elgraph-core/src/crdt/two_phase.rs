//! Two-phase set with timestamped entries.
//!
//! A [`TwoPhaseSet`] keeps two maps keyed by [`ElementId`]: the add-set and
//! the remove-set (tombstones). Entries are never erased. Each entry records
//! the payload and the [`Timestamp`] of the operation that wrote it.
//!
//! # Merge
//!
//! The two maps merge independently. Keys union; when both sides hold a
//! key, the entry with the strictly later timestamp wins and an exact tie
//! keeps the receiver's entry.
//!
//! # Visibility
//!
//! An element is visible iff it has an add entry and either no remove entry
//! or a remove entry that is not strictly later than the add. A re-add after
//! a removal therefore resurrects the element, and an add/remove tie favors
//! the add.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::merge::Merge;
use crate::clock::Timestamp;
use crate::error::Error;
use crate::id::ElementId;

// ---------------------------------------------------------------------------
// Timestamped
// ---------------------------------------------------------------------------

/// A payload plus the timestamp of the operation that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub payload: T,
    pub timestamp: Timestamp,
}

impl<T> Timestamped<T> {
    pub const fn new(payload: T, timestamp: Timestamp) -> Self {
        Self { payload, timestamp }
    }
}

/// Last-writer-wins join: strictly later replaces, ties keep `self`.
impl<T: Clone> Merge for Timestamped<T> {
    fn merge(&mut self, other: &Self) {
        if other.timestamp.is_after(&self.timestamp) {
            self.clone_from(other);
        }
    }
}

/// Returns true if an element with add entry `added` survives the optional
/// tombstone `removed`.
///
/// Add wins only on an identical stamp. Stamps from different replicas are
/// never identical, so an add and a remove at the same wall time from two
/// replicas are decided by replica id.
#[must_use]
pub fn survives<T, U>(added: &Timestamped<T>, removed: Option<&Timestamped<U>>) -> bool {
    removed.is_none_or(|tombstone| !tombstone.timestamp.is_after(&added.timestamp))
}

// ---------------------------------------------------------------------------
// TwoPhaseSet
// ---------------------------------------------------------------------------

/// Add-set/remove-set pair keyed by element id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoPhaseSet<T> {
    add_set: BTreeMap<ElementId, Timestamped<T>>,
    remove_set: BTreeMap<ElementId, Timestamped<T>>,
}

impl<T> TwoPhaseSet<T> {
    /// Create a new empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            add_set: BTreeMap::new(),
            remove_set: BTreeMap::new(),
        }
    }

    /// Record an add of `id`, overwriting any previous add entry for it.
    ///
    /// No uniqueness is enforced here; callers decide whether to add.
    pub fn add(&mut self, id: ElementId, payload: T, at: Timestamp) {
        self.add_set.insert(id, Timestamped::new(payload, at));
    }

    /// All add entries.
    #[must_use]
    pub const fn add_set(&self) -> &BTreeMap<ElementId, Timestamped<T>> {
        &self.add_set
    }

    /// All remove entries (tombstones).
    #[must_use]
    pub const fn remove_set(&self) -> &BTreeMap<ElementId, Timestamped<T>> {
        &self.remove_set
    }

    /// Whether `id` is currently visible.
    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.add_set
            .get(id)
            .is_some_and(|added| survives(added, self.remove_set.get(id)))
    }

    /// Iterate the visible elements in id order.
    pub fn live(&self) -> impl Iterator<Item = (&ElementId, &Timestamped<T>)> + '_ {
        self.add_set
            .iter()
            .filter(|(id, added)| survives(added, self.remove_set.get(id)))
    }

    /// Number of visible elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().count()
    }

    /// Returns true if no element is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live().next().is_none()
    }
}

impl<T: Clone> TwoPhaseSet<T> {
    /// Record a tombstone for `id`, carrying the payload of its add entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotObserved`] if `id` has no add entry on this
    /// replica; the remove-set is left unchanged.
    pub fn remove(&mut self, id: ElementId, at: Timestamp) -> Result<(), Error> {
        let Some(added) = self.add_set.get(&id) else {
            return Err(Error::NotObserved(id));
        };
        let payload = added.payload.clone();
        self.remove_set.insert(id, Timestamped::new(payload, at));
        Ok(())
    }
}

impl<T> Default for TwoPhaseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn join_map<T: Clone>(
    into: &mut BTreeMap<ElementId, Timestamped<T>>,
    from: &BTreeMap<ElementId, Timestamped<T>>,
) {
    for (id, theirs) in from {
        match into.get_mut(id) {
            Some(ours) => ours.merge(theirs),
            None => {
                into.insert(*id, theirs.clone());
            }
        }
    }
}

impl<T: Clone> Merge for TwoPhaseSet<T> {
    fn merge(&mut self, other: &Self) {
        join_map(&mut self.add_set, &other.add_set);
        join_map(&mut self.remove_set, &other.remove_set);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
