//! elgraph-sim library.
//!
//! Drives several [`elgraph_core::ReplicatedGraph`] replicas through random
//! mutations, gossiping full state snapshots over a fault-injecting
//! in-memory network, then checks that they converge.
//!
//! A run is a pure function of its [`SimulationConfig`]: the same seed
//! produces the same trace.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod clock;
pub mod network;
pub mod oracle;
pub mod replica;
pub mod rng;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{ClockConfig, ClockSpec, SimulatedClock};
use crate::network::{FaultConfig, NetworkMessage, SimulatedNetwork};
use crate::oracle::{ConvergenceOracle, ConvergenceReport};
use crate::replica::{Mutation, MutationKind, ReplicaIndex, ReplicaSnapshot, SimulatedReplica};
use crate::rng::DeterministicRng;

/// Parameters for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub replica_count: usize,
    pub rounds: u64,
    /// Peers each replica gossips its state to per round.
    pub fanout: usize,
    /// Number of distinct node ids mutations draw from.
    pub node_space: u64,
    pub fault: FaultConfig,
    pub clock: ClockConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            replica_count: 4,
            rounds: 24,
            fanout: 2,
            node_space: 12,
            fault: FaultConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

/// One step recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Mutate {
        replica: ReplicaIndex,
        mutation: Mutation,
    },
    Send {
        from: ReplicaIndex,
        to: ReplicaIndex,
        dropped: bool,
        duplicated: bool,
        delay_rounds: u8,
    },
    Deliver {
        from: ReplicaIndex,
        to: ReplicaIndex,
        sent_round: u64,
    },
    Reorder {
        messages: usize,
    },
    Partition {
        replica: ReplicaIndex,
        isolated: bool,
    },
    Freeze {
        replica: ReplicaIndex,
    },
    Unfreeze {
        replica: ReplicaIndex,
    },
    /// End-of-run pass in which every replica merged every other's state.
    AntiEntropy {
        merges: usize,
    },
}

impl TraceEventKind {
    /// Whether this step exercised a fault or a removal/re-add conflict.
    #[must_use]
    pub const fn is_interesting(&self) -> bool {
        match self {
            Self::Send {
                dropped, duplicated, ..
            } => *dropped || *duplicated,
            Self::Reorder { .. } | Self::Partition { .. } | Self::Freeze { .. } => true,
            Self::Mutate { mutation, .. } => {
                mutation.applied && matches!(mutation.kind, MutationKind::Readd)
            }
            Self::Deliver { .. } | Self::Unfreeze { .. } | Self::AntiEntropy { .. } => false,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    pub trace: Vec<TraceEvent>,
    /// Final replica states, in index order.
    pub snapshots: Vec<ReplicaSnapshot>,
    pub convergence: ConvergenceReport,
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// BLAKE3 digest of the serialized trace, for comparing replays.
    ///
    /// # Errors
    ///
    /// Returns an error if a trace event fails to serialize.
    pub fn trace_fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        for event in &self.trace {
            let bytes = serde_json::to_vec(event)
                .with_context(|| format!("failed to encode trace event at round {}", event.round))?;
            hasher.update(&bytes);
            hasher.update(b"\n");
        }
        Ok(format!("blake3:{}", hasher.finalize()))
    }

    /// Number of mutations the replicated graphs accepted.
    #[must_use]
    pub fn applied_mutations(&self) -> usize {
        self.trace
            .iter()
            .filter(|event| {
                matches!(event.kind, TraceEventKind::Mutate { mutation, .. } if mutation.applied)
            })
            .count()
    }
}

/// Deterministic multi-replica simulator.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    replicas: Vec<SimulatedReplica>,
    clocks: Vec<SimulatedClock>,
    /// Round at which each frozen clock thaws.
    thaw_at: Vec<Option<u64>>,
    network: SimulatedNetwork,
    trace: Vec<TraceEvent>,
}

impl Simulator {
    /// Set up replicas and clocks for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config has no replicas or no rounds.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.replica_count == 0 {
            bail!("replica_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }

        let mut rng = DeterministicRng::new(config.seed);
        let clocks: Vec<SimulatedClock> = (0..config.replica_count)
            .map(|_| SimulatedClock::new(ClockSpec::assign(&config.clock, &mut rng)))
            .collect();
        let replicas = clocks
            .iter()
            .enumerate()
            .map(|(index, clock)| SimulatedReplica::new(index, config.node_space, clock.now(0)))
            .collect();

        Ok(Self {
            config,
            rng,
            replicas,
            clocks,
            thaw_at: vec![None; config.replica_count],
            network: SimulatedNetwork::new(config.fault),
            trace: Vec::new(),
        })
    }

    /// Run every round, drain the network, reconcile, and report.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for fallible replica
    /// backends.
    #[tracing::instrument(level = "debug", skip(self), fields(seed = self.config.seed))]
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.inject_faults(round);
            for index in 0..self.replicas.len() {
                self.mutate(index, round);
                self.gossip(index, round);
            }
            self.deliver(round);
        }

        let final_round = self.config.rounds;
        for message in self.network.drain() {
            self.apply(final_round, &message);
        }
        self.anti_entropy(final_round);

        let snapshots: Vec<ReplicaSnapshot> =
            self.replicas.iter().map(SimulatedReplica::snapshot).collect();
        let convergence = ConvergenceOracle::evaluate(&snapshots);
        let interesting_state_reached = self.trace.iter().any(|event| event.kind.is_interesting());

        info!(
            seed = self.config.seed,
            trace_events = self.trace.len(),
            converged = convergence.converged,
            nodes = convergence.canonical_node_count,
            edges = convergence.canonical_edge_count,
            "simulation complete"
        );

        Ok(SimulationResult {
            config: self.config,
            trace: self.trace.clone(),
            snapshots,
            convergence,
            interesting_state_reached,
        })
    }

    fn record(&mut self, round: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { round, kind });
    }

    fn inject_faults(&mut self, round: u64) {
        let count = self.replicas.len();

        for index in 0..count {
            if self.thaw_at[index].is_some_and(|at| at <= round) {
                self.thaw_at[index] = None;
                self.clocks[index].unfreeze();
                self.record(round, TraceEventKind::Unfreeze { replica: index });
            }
        }

        if self.rng.hit_rate_percent(self.config.fault.partition_rate_percent) {
            let replica = self.rng.next_index(count);
            let isolated = !self.network.is_partitioned(replica);
            self.network.set_partitioned(replica, isolated);
            self.record(round, TraceEventKind::Partition { replica, isolated });
        }

        if self.rng.hit_rate_percent(self.config.fault.freeze_rate_percent) {
            let replica = self.rng.next_index(count);
            if !self.clocks[replica].is_frozen() {
                self.clocks[replica].freeze(round);
                let duration = u64::from(self.config.fault.freeze_duration_rounds);
                self.thaw_at[replica] = Some(round.saturating_add(duration));
                self.record(round, TraceEventKind::Freeze { replica });
            }
        }
    }

    fn mutate(&mut self, index: ReplicaIndex, round: u64) {
        let wall = self.clocks[index].now(round);
        let replica = &mut self.replicas[index];
        replica.sync_clock(wall);
        let mutation = replica.step(&mut self.rng);
        debug!(replica = index, ?mutation, "mutate");
        self.record(round, TraceEventKind::Mutate {
            replica: index,
            mutation,
        });
    }

    fn gossip(&mut self, from: ReplicaIndex, round: u64) {
        let peers = self
            .rng
            .sample_excluding(self.replicas.len(), from, self.config.fanout);
        if peers.is_empty() {
            return;
        }
        let state = self.replicas[from].state();
        for to in peers {
            let message = NetworkMessage {
                from,
                to,
                sent_round: round,
                state: state.clone(),
            };
            let outcome = self.network.send(message, round, &mut self.rng);
            self.record(round, TraceEventKind::Send {
                from,
                to,
                dropped: outcome.dropped,
                duplicated: outcome.duplicated,
                delay_rounds: outcome.delay_rounds,
            });
        }
    }

    fn deliver(&mut self, round: u64) {
        let outcome = self.network.deliver_ready(round, &mut self.rng);
        if outcome.reordered {
            self.record(round, TraceEventKind::Reorder {
                messages: outcome.delivered.len(),
            });
        }
        for message in &outcome.delivered {
            self.apply(round, message);
        }
    }

    fn apply(&mut self, round: u64, message: &NetworkMessage) {
        let wall = self.clocks[message.to].now(round);
        let replica = &mut self.replicas[message.to];
        replica.sync_clock(wall);
        replica.receive(&message.state);
        self.record(round, TraceEventKind::Deliver {
            from: message.from,
            to: message.to,
            sent_round: message.sent_round,
        });
    }

    /// Every replica merges every other replica's pre-pass state, so lost
    /// messages cannot keep replicas apart.
    fn anti_entropy(&mut self, round: u64) {
        let states: Vec<_> = self.replicas.iter().map(SimulatedReplica::state).collect();
        let mut merges = 0_usize;
        for replica in &mut self.replicas {
            for (index, state) in states.iter().enumerate() {
                if index != replica.index() {
                    replica.receive(state);
                    merges += 1;
                }
            }
        }
        // A lone replica never merges; regenerate so its cache matches its sets.
        if merges == 0 {
            for replica in &mut self.replicas {
                let own = replica.state();
                replica.receive(&own);
            }
        }
        self.record(round, TraceEventKind::AntiEntropy { merges });
    }
}
