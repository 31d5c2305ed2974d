use std::collections::BTreeSet;

use elgraph_core::GraphState;
use serde::{Deserialize, Serialize};

use crate::replica::ReplicaIndex;
use crate::rng::DeterministicRng;

/// Fault injection configuration for simulated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of sends dropped.
    pub drop_rate_percent: u8,
    /// Percentage of sends duplicated.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of reordering ready messages at each tick.
    pub reorder_rate_percent: u8,
    /// Percentage chance per round to toggle a random partition.
    pub partition_rate_percent: u8,
    /// Percentage chance per round to freeze a random clock.
    pub freeze_rate_percent: u8,
    /// Rounds a frozen clock stays frozen.
    pub freeze_duration_rounds: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            drop_rate_percent: 5,
            duplicate_rate_percent: 3,
            reorder_rate_percent: 5,
            partition_rate_percent: 2,
            freeze_rate_percent: 2,
            freeze_duration_rounds: 2,
        }
    }
}

impl FaultConfig {
    /// No faults at all: every send arrives on the next tick.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_delay_rounds: 0,
            drop_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            partition_rate_percent: 0,
            freeze_rate_percent: 0,
            freeze_duration_rounds: 0,
        }
    }
}

/// A full state snapshot in flight from one replica to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    pub from: ReplicaIndex,
    pub to: ReplicaIndex,
    /// Round the snapshot was taken in.
    pub sent_round: u64,
    pub state: GraphState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingMessage {
    deliver_at_round: u64,
    message: NetworkMessage,
}

/// Result of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Dropped before enqueue (fault or partition).
    pub dropped: bool,
    pub duplicated: bool,
    pub delay_rounds: u8,
}

/// Messages handed over in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<NetworkMessage>,
    pub reordered: bool,
}

/// Deterministic fault-injecting network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pending: Vec<PendingMessage>,
    partitioned: BTreeSet<ReplicaIndex>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            partitioned: BTreeSet::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Isolate or reconnect a replica.
    pub fn set_partitioned(&mut self, replica: ReplicaIndex, isolated: bool) {
        if isolated {
            self.partitioned.insert(replica);
        } else {
            self.partitioned.remove(&replica);
        }
    }

    #[must_use]
    pub fn is_partitioned(&self, replica: ReplicaIndex) -> bool {
        self.partitioned.contains(&replica)
    }

    /// Number of queued in-flight messages.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enqueue a message, subject to partitions, drops, delay and
    /// duplication.
    pub fn send(
        &mut self,
        message: NetworkMessage,
        round: u64,
        rng: &mut DeterministicRng,
    ) -> SendOutcome {
        let dropped = SendOutcome {
            dropped: true,
            duplicated: false,
            delay_rounds: 0,
        };
        if self.is_partitioned(message.from) || self.is_partitioned(message.to) {
            return dropped;
        }
        if rng.hit_rate_percent(self.fault.drop_rate_percent) {
            return dropped;
        }

        let delay_bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay = u8::try_from(rng.next_bounded(delay_bound))
            .unwrap_or(self.fault.max_delay_rounds);
        let deliver_at_round = round.saturating_add(u64::from(delay));

        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            self.pending.push(PendingMessage {
                deliver_at_round,
                message: message.clone(),
            });
        }
        self.pending.push(PendingMessage {
            deliver_at_round,
            message,
        });

        SendOutcome {
            dropped: false,
            duplicated,
            delay_rounds: delay,
        }
    }

    /// Hand over every message due by `round`.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (mut ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.deliver_at_round <= round);
        self.pending = future;

        let reordered = ready.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            rng.shuffle(&mut ready);
        }

        DeliverOutcome {
            delivered: ready.into_iter().map(|pending| pending.message).collect(),
            reordered,
        }
    }

    /// Hand over everything still queued, in send order, and heal all
    /// partitions.
    pub fn drain(&mut self) -> Vec<NetworkMessage> {
        self.partitioned.clear();
        self.pending
            .drain(..)
            .map(|pending| pending.message)
            .collect()
    }
}
