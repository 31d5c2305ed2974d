//! Timestamps and the clocks that issue them.
//!
//! Conflict resolution in this crate is last-writer-wins over wall-clock
//! time. A [`Timestamp`] pairs the wall reading with the issuing
//! [`ReplicaId`], so two different replicas can never produce equal stamps;
//! only two writes by the same replica at the same instant compare equal.
//!
//! Wall clocks on different machines drift apart. A replica whose clock runs
//! ahead wins conflicts it should have lost. [`skew`] detects large gaps at
//! merge time and reports them; nothing here corrects them.

pub mod skew;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ReplicaId;

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Total order used for conflict resolution: wall time, then replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Wall-clock reading at the moment the operation was issued.
    pub wall: DateTime<Utc>,
    /// Replica that issued the operation.
    pub replica: ReplicaId,
}

impl Timestamp {
    #[must_use]
    pub const fn new(wall: DateTime<Utc>, replica: ReplicaId) -> Self {
        Self { wall, replica }
    }

    /// Returns true if `self` is strictly later than `other`.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.wall.to_rfc3339(), self.replica)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of timestamps for one replica.
pub trait Clock {
    /// Issue a timestamp for a new operation.
    fn now(&mut self) -> Timestamp;

    /// Read the current wall time without issuing a stamp.
    fn wall(&self) -> DateTime<Utc>;

    /// The replica this clock stamps for.
    fn replica(&self) -> ReplicaId;
}

/// Wall-clock backed [`Clock`].
///
/// Stamps issued by one instance are strictly increasing: if the OS clock
/// has not advanced since the last stamp, the new stamp is bumped by one
/// nanosecond past it.
#[derive(Debug, Clone)]
pub struct SystemClock {
    replica: ReplicaId,
    last: Option<DateTime<Utc>>,
}

impl SystemClock {
    #[must_use]
    pub const fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            last: None,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(ReplicaId::random())
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Timestamp {
        let mut wall = Utc::now();
        if let Some(last) = self.last {
            if wall <= last {
                wall = last + Duration::nanoseconds(1);
            }
        }
        self.last = Some(wall);
        Timestamp::new(wall, self.replica)
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn replica(&self) -> ReplicaId {
        self.replica
    }
}

/// Caller-driven [`Clock`] for tests and simulations.
///
/// Each issued stamp advances the clock by `step`. A zero step freezes the
/// clock so consecutive operations share one timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualClock {
    replica: ReplicaId,
    current: DateTime<Utc>,
    step: Duration,
}

impl ManualClock {
    /// Clock starting at `start` that advances one microsecond per stamp.
    #[must_use]
    pub fn new(replica: ReplicaId, start: DateTime<Utc>) -> Self {
        Self {
            replica,
            current: start,
            step: Duration::microseconds(1),
        }
    }

    /// Replace the per-stamp step.
    #[must_use]
    pub const fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Jump to an absolute time, forwards or backwards.
    pub fn set(&mut self, at: DateTime<Utc>) {
        self.current = at;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&mut self, by: Duration) {
        self.current += by;
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Timestamp {
        let stamp = Timestamp::new(self.current, self.replica);
        self.current += self.step;
        stamp
    }

    fn wall(&self) -> DateTime<Utc> {
        self.current
    }

    fn replica(&self) -> ReplicaId {
        self.replica
    }
}
