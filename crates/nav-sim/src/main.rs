//! nav-sim - drive the batched path scheduler with a wandering crowd.
//!
//! - `nav-sim run` - run a scenario and print a summary
//! - `nav-sim config` - print the default scenario as YAML

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod scenario;
mod sim;

use scenario::Scenario;
use sim::Simulation;

#[derive(Parser)]
#[command(name = "nav-sim")]
#[command(about = "Batched grid pathfinding simulator", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario YAML file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of ticks
        #[arg(long)]
        ticks: Option<u32>,

        /// Override the number of agents
        #[arg(long)]
        agents: Option<usize>,

        /// Override the RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default scenario
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            agents,
            seed,
            json,
        } => {
            let mut scenario = match &config {
                Some(path) => Scenario::load(path)?,
                None => Scenario::default(),
            };
            if let Some(ticks) = ticks {
                scenario.ticks = ticks;
            }
            if let Some(agents) = agents {
                scenario.agents = agents;
            }
            if let Some(seed) = seed {
                scenario.seed = seed;
            }
            run_scenario(scenario, json)
        }
        Commands::Config => {
            print!("{}", Scenario::default().to_yaml()?);
            Ok(())
        }
    }
}

fn run_scenario(scenario: Scenario, json: bool) -> Result<()> {
    tracing::info!(
        agents = scenario.agents,
        ticks = scenario.ticks,
        seed = scenario.seed,
        "Starting simulation"
    );

    let report = Simulation::new(scenario)?.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("nav-sim report");
        println!("==============");
        println!("{}", report.summary());
    }
    Ok(())
}
