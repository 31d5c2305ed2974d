#![forbid(unsafe_code)]

use std::env;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use elgraph_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use serde::Serialize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Deterministic convergence campaigns for the replicated graph.
#[derive(Parser, Debug)]
#[command(name = "elgraph-sim", version, about)]
struct Cli {
    /// Output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a campaign across many seeds.
    #[command(after_help = "EXAMPLES:\n    elgraph-sim run --seeds 200 --replicas 6 --faults 0.2\n    \
                            elgraph-sim --format json run --seeds 50")]
    Run(RunArgs),

    /// Replay one seed with its trace.
    #[command(after_help = "EXAMPLES:\n    elgraph-sim replay --seed 42 --replicas 6")]
    Replay(ReplayArgs),
}

/// Parameters shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
struct SimParams {
    /// Number of simulated replicas.
    #[arg(long, default_value = "5")]
    replicas: usize,

    /// Rounds per seed.
    #[arg(long, default_value = "24")]
    rounds: u64,

    /// Peers each replica gossips to per round.
    #[arg(long, default_value = "2")]
    fanout: usize,

    /// Distinct node ids mutations draw from.
    #[arg(long, default_value = "12")]
    node_space: u64,

    /// Overall fault probability between 0.0 and 1.0; scales drop,
    /// duplicate, reorder, partition and freeze rates.
    #[arg(long, default_value = "0.1")]
    faults: f64,

    /// Maximum delivery delay in rounds.
    #[arg(long, default_value = "3")]
    max_delay: u8,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    seeds: u64,

    /// First seed.
    #[arg(long, default_value = "0")]
    seed_start: u64,

    #[command(flatten)]
    params: SimParams,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    seed: u64,

    /// Print every trace event.
    #[arg(long)]
    trace: bool,

    #[command(flatten)]
    params: SimParams,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    trace_events: usize,
    applied_mutations: usize,
    replicas: usize,
    converged: bool,
    nodes: usize,
    edges: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    trace_fingerprint: String,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let passed = match &cli.command {
        Command::Run(args) => run(args, cli.format)?,
        Command::Replay(args) => replay(args, cli.format)?,
    };

    // Non-zero exit for CI on any failing seed.
    if !passed {
        process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ELGRAPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "elgraph=debug,info"
        } else {
            "elgraph=info,warn"
        })
    });

    let format = env::var("ELGRAPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn campaign_config(seed_start: u64, seeds: u64, params: &SimParams) -> CampaignConfig {
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        replica_count: params.replicas,
        rounds: params.rounds,
        fanout: params.fanout,
        node_space: params.node_space,
        fault_drop_percent: scale_fault(params.faults, 50),
        fault_duplicate_percent: scale_fault(params.faults, 25),
        fault_reorder_percent: scale_fault(params.faults, 50),
        fault_partition_percent: scale_fault(params.faults, 25),
        fault_max_delay: params.max_delay,
        fault_freeze_percent: scale_fault(params.faults, 25),
        fault_freeze_duration: 2,
    }
}

/// Scale a base fault probability (0.0 to 1.0) by a weight into a percent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_fault(base: f64, weight_pct: u8) -> u8 {
    let raw = base * f64::from(weight_pct);
    raw.clamp(0.0, 100.0) as u8
}

fn run(args: &RunArgs, format: OutputFormat) -> Result<bool> {
    let config = campaign_config(args.seed_start, args.seeds, &args.params);
    let report = run_campaign(&config)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "campaign seeds_run={} replicas={} rounds={} faults_pct={:.0}",
                report.seeds_run,
                args.params.replicas,
                args.params.rounds,
                args.params.faults * 100.0
            );
            println!(
                "results passed={} failed={} interesting_states={} all_passed={}",
                report.seeds_passed,
                report.failures.len(),
                report.interesting_states_reached,
                report.all_passed()
            );
            for failure in report.failures.iter().take(5) {
                println!("failure seed={}", failure.seed);
                for violation in &failure.violations {
                    println!("  - {violation}");
                }
            }
            if report.failures.len() > 5 {
                println!("failures_truncated count={}", report.failures.len() - 5);
            }
            if let Some(seed) = report.first_failure {
                println!(
                    "hint: elgraph-sim replay --seed {seed} --replicas {} --rounds {}",
                    args.params.replicas, args.params.rounds
                );
            }
        }
    }

    Ok(report.all_passed())
}

fn replay(args: &ReplayArgs, format: OutputFormat) -> Result<bool> {
    let config = campaign_config(args.seed, 1, &args.params);
    let trace = replay_seed(args.seed, &config)?;
    let result = &trace.result;

    let out = ReplayOutput {
        seed: args.seed,
        trace_events: result.trace.len(),
        applied_mutations: result.applied_mutations(),
        replicas: result.snapshots.len(),
        converged: result.convergence.converged,
        nodes: result.convergence.canonical_node_count,
        edges: result.convergence.canonical_edge_count,
        oracle_passed: trace.oracle.passed,
        violations: trace.oracle.violations.iter().map(format_violation).collect(),
        interesting_state_reached: result.interesting_state_reached,
        trace_fingerprint: result.trace_fingerprint()?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
        OutputFormat::Text => {
            println!(
                "replay seed={} replicas={} rounds={} fanout={}",
                out.seed, args.params.replicas, args.params.rounds, args.params.fanout
            );
            println!(
                "result converged={} oracle_passed={} nodes={} edges={} trace_events={} applied_mutations={} interesting={} fingerprint={}",
                out.converged,
                out.oracle_passed,
                out.nodes,
                out.edges,
                out.trace_events,
                out.applied_mutations,
                out.interesting_state_reached,
                out.trace_fingerprint
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            for snapshot in &result.snapshots {
                println!(
                    "replica index={} id={} nodes={} edges={} entries={}",
                    snapshot.index,
                    snapshot.replica,
                    snapshot.graph.node_count(),
                    snapshot.graph.edge_count(),
                    snapshot.state.entry_count()
                );
            }
            if args.trace {
                for event in &result.trace {
                    println!("round={} {:?}", event.round, event.kind);
                }
            }
        }
    }

    Ok(trace.oracle.passed)
}
