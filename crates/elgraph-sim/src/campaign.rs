//! Campaign runner: many seeds, one report.
//!
//! Executes a seed range with shared parameters, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::ClockConfig;
use crate::network::FaultConfig;
use crate::oracle::{ConvergenceOracle, InvariantViolation, OracleResult};
use crate::rng::DeterministicRng;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Parameters shared by every seed in a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub replica_count: usize,
    pub rounds: u64,
    /// Peers each replica gossips to per round.
    pub fanout: usize,
    /// Distinct node ids mutations draw from.
    pub node_space: u64,
    pub fault_drop_percent: u8,
    pub fault_duplicate_percent: u8,
    pub fault_reorder_percent: u8,
    pub fault_partition_percent: u8,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    pub fault_freeze_percent: u8,
    /// Clock freeze duration in rounds.
    pub fault_freeze_duration: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            replica_count: 5,
            rounds: 24,
            fanout: 2,
            node_space: 12,
            fault_drop_percent: 10,
            fault_duplicate_percent: 5,
            fault_reorder_percent: 10,
            fault_partition_percent: 5,
            fault_max_delay: 3,
            fault_freeze_percent: 5,
            fault_freeze_duration: 2,
        }
    }
}

impl CampaignConfig {
    /// The [`SimulationConfig`] for one seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            replica_count: self.replica_count,
            rounds: self.rounds,
            fanout: self.fanout,
            node_space: self.node_space,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                drop_rate_percent: self.fault_drop_percent,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
                partition_rate_percent: self.fault_partition_percent,
                freeze_rate_percent: self.fault_freeze_percent,
                freeze_duration_rounds: self.fault_freeze_duration,
            },
            clock: ClockConfig::default(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.replica_count == 0 {
            bail!("replica_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.node_space == 0 {
            bail!("node_space must be > 0");
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate campaign outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds whose run hit at least one fault or resurrection.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A replayed seed with its oracle verdict.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run every seed in `config`.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation cannot be set
/// up.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let trace = run_seed(seed, config)?;

        if trace.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if trace.oracle.passed {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = trace.oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: trace.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign complete"
    );
    Ok(report)
}

/// Run one seed: `Ok(Ok(()))` on pass, `Ok(Err(violations))` on failure.
///
/// # Errors
///
/// The outer error is reserved for simulations that cannot run at all.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = run_seed(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay one seed with its full trace for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    run_seed(seed, config)
}

fn run_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;

    let mut oracle_rng = DeterministicRng::new(seed.wrapping_add(0xDEAD));
    let oracle = ConvergenceOracle::check_all(&result.snapshots, &mut oracle_rng);

    Ok(DetailedTrace { result, oracle })
}

/// One-line description of a violation.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::Convergence {
            replica_a,
            replica_b,
            only_in_a,
            only_in_b,
            state_differs,
        } => format!(
            "Convergence: replicas {replica_a} and {replica_b} diverge \
             (only_in_a={}, only_in_b={}, state_differs={state_differs})",
            only_in_a.len(),
            only_in_b.len()
        ),
        InvariantViolation::Idempotence {
            replica,
            graph_changed,
            state_changed,
        } => format!(
            "Idempotence: self-merge on replica {replica} changed state \
             (graph_changed={graph_changed}, state_changed={state_changed})"
        ),
        InvariantViolation::Commutativity {
            permutation_index,
            canonical_nodes,
            shuffled_nodes,
            canonical_edges,
            shuffled_edges,
        } => format!(
            "Commutativity: permutation {permutation_index} diverges \
             (nodes {canonical_nodes} vs {shuffled_nodes}, edges {canonical_edges} vs {shuffled_edges})"
        ),
        InvariantViolation::Derivability {
            replica,
            nodes,
            expected_nodes,
            edges,
            expected_edges,
        } => format!(
            "Derivability: replica {replica} graph has {nodes} nodes/{edges} edges, \
             sets regenerate to {expected_nodes}/{expected_edges}"
        ),
        InvariantViolation::DanglingEdge { replica, edge } => {
            format!("DanglingEdge: replica {replica} holds edge {edge} with a missing endpoint")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delay, reorder, duplicate and freeze only.
    fn gentle(seeds: Range<u64>) -> CampaignConfig {
        CampaignConfig {
            seed_range: seeds,
            replica_count: 3,
            rounds: 16,
            fanout: 2,
            fault_drop_percent: 0,
            fault_partition_percent: 0,
            ..CampaignConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_replicas_rejected() {
        let config = CampaignConfig {
            replica_count: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rounds_rejected() {
        let config = CampaignConfig {
            rounds: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_node_space_rejected() {
        let config = CampaignConfig {
            node_space: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_carries_parameters() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.replica_count, config.replica_count);
        assert_eq!(sim.rounds, config.rounds);
        assert_eq!(sim.fault.drop_rate_percent, config.fault_drop_percent);
    }

    #[test]
    fn single_seed_passes() {
        let result = run_single_seed(0, &gentle(0..1)).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn gentle_campaign_passes() {
        let report = run_campaign(&gentle(0..10)).expect("campaign should not error");
        assert_eq!(report.seeds_run, 10);
        assert_eq!(report.seeds_passed, 10);
        assert!(report.all_passed());
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn hostile_campaign_still_converges() {
        // Drops and partitions lose gossip; the final anti-entropy pass
        // must still bring every replica together.
        let config = CampaignConfig {
            seed_range: 0..50,
            replica_count: 4,
            rounds: 16,
            fanout: 1,
            fault_drop_percent: 30,
            fault_duplicate_percent: 15,
            fault_reorder_percent: 20,
            fault_partition_percent: 15,
            fault_max_delay: 3,
            fault_freeze_percent: 15,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(
            report.all_passed(),
            "{} failures, first at seed {:?}: {:?}",
            report.failures.len(),
            report.first_failure,
            report.failures.first()
        );
        assert!(report.interesting_states_reached > 0);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");
        assert_eq!(first.result.trace, second.result.trace);
        assert_eq!(first.result.snapshots, second.result.snapshots);
        assert!(first.oracle.passed, "{:?}", first.oracle.violations);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["Convergence: replicas 0 and 1 diverge".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn violations_format_readably() {
        let v = InvariantViolation::Convergence {
            replica_a: 0,
            replica_b: 1,
            only_in_a: vec![crate::replica::node_id(3)],
            only_in_b: vec![],
            state_differs: true,
        };
        let s = format_violation(&v);
        assert!(s.contains("Convergence"));
        assert!(s.contains("replicas 0 and 1"));

        let d = InvariantViolation::DanglingEdge {
            replica: 2,
            edge: crate::replica::node_id(9),
        };
        assert!(format_violation(&d).starts_with("DanglingEdge"));
    }
}
