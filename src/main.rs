use anyhow::Result;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::runtime::Builder;

use dv_router::Millis;
use dv_router::config::SimulationConfig;
use dv_router::network::{LiveNetwork, Simulator, TraceOutcome};
use dv_router::protocol::{NodeId, RoutingTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Deterministic discrete-event replay
    Sim,
    /// One tokio task per node, real timers
    Live,
}

#[derive(Parser)]
#[command(name = "dvsim", about = "Run distance-vector routers over a topology file")]
struct Cli {
    /// JSON topology file
    #[arg(long)]
    topology: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Sim)]
    mode: Mode,

    /// Heartbeat interval in ms (overrides the file)
    #[arg(long)]
    heartbeat: Option<Millis>,

    /// How long to run in ms (overrides the file)
    #[arg(long)]
    duration: Option<Millis>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let mut config = SimulationConfig::load(&cli.topology)?;
    if let Some(heartbeat) = cli.heartbeat {
        config.heartbeat_interval = heartbeat;
    }
    if let Some(duration) = cli.duration {
        config.duration = duration;
    }
    config.validate()?;

    println!(
        "Running {} nodes, {} links for {} ms ({:?} mode, heartbeat {} ms)",
        config.nodes.len(),
        config.links.len(),
        config.duration,
        cli.mode,
        config.heartbeat_interval
    );

    let problems = match cli.mode {
        Mode::Sim => run_simulation(&config),
        Mode::Live => run_live(&config)?,
    };

    if problems.is_empty() {
        println!("\nConverged: every table matches the shortest paths");
    } else {
        println!("\nNot converged:");
        for problem in problems {
            println!("  {}", problem);
        }
    }

    Ok(())
}

fn run_simulation(config: &SimulationConfig) -> Vec<String> {
    let mut simulator = Simulator::from_config(config);
    simulator.run_until(config.duration);

    print_tables(&simulator.tables());

    if !simulator.traces().is_empty() {
        println!("\n=== Traceroutes ===");
    }
    for trace in simulator.traces() {
        let outcome = match &trace.outcome {
            TraceOutcome::Delivered { at } => format!("delivered at {} ms", at),
            TraceOutcome::Dropped { at, node } => format!("dropped at {} by {}", at, node),
            TraceOutcome::HopLimit { at } => format!("hop limit hit at {} ms", at),
            TraceOutcome::InFlight => "still in flight".to_string(),
        };
        println!(
            "{} -> {} @{}: {} ({})",
            trace.source,
            trace.destination,
            trace.sent_at,
            trace.path.join(" > "),
            outcome
        );
    }

    simulator.mismatches()
}

fn run_live(config: &SimulationConfig) -> Result<Vec<String>> {
    if !config.traceroutes.is_empty() {
        println!("Traceroutes are only replayed in sim mode, skipping {}", config.traceroutes.len());
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;
    let (snapshots, topology) = rt.block_on(LiveNetwork::run(config))?;

    let tables: BTreeMap<NodeId, RoutingTable> = snapshots
        .iter()
        .map(|(id, snapshot)| (id.clone(), snapshot.table.clone()))
        .collect();
    print_tables(&tables);

    println!("\n=== Counters ===");
    for (id, snapshot) in &snapshots {
        let stats = &snapshot.stats;
        println!(
            "{}: {} recomputes, {} changes, {} broadcasts, {} duplicates suppressed",
            id, stats.recomputes, stats.table_changes, stats.broadcasts, stats.duplicates_suppressed
        );
    }

    Ok(topology.mismatches(tables.iter()))
}

fn print_tables(tables: &BTreeMap<NodeId, RoutingTable>) {
    for (id, table) in tables {
        println!("\n=== Routing table of {} ===", id);
        print!("{}", table);
    }
}
