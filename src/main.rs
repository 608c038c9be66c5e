use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::time::sleep;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chronos_election::raft::NodeStatus;
use chronos_election::{Config, DeliveryPolicy, LocalCluster, Simulation};

fn init_logging() {
    if std::env::var("ELECTION_LOG_PLAIN").is_ok() {
        // Plain env_logger output, no tracing spans
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
        return;
    }

    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[derive(Parser)]
#[command(name = "chronos-election")]
#[command(about = "Raft leader election, simulated or on a live local cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a deterministic round-based simulation on a manual clock
    Simulate {
        #[command(flatten)]
        cluster: ClusterArgs,

        /// Number of driver rounds to run
        #[arg(short, long, default_value_t = 60)]
        rounds: u64,

        /// Crash whichever node leads at this round
        #[arg(long)]
        crash_leader_at: Option<u64>,

        /// Deliver each batch of messages in random order
        #[arg(long)]
        shuffle: bool,

        /// Probability that a message is delivered twice
        #[arg(long, default_value_t = 0.0)]
        duplicate_probability: f64,
    },

    /// Run a live cluster on tokio tasks and wall-clock timers
    Run {
        #[command(flatten)]
        cluster: ClusterArgs,

        /// How long to run before printing the final status
        #[arg(short, long, default_value_t = 30)]
        duration_secs: u64,

        /// Crash whichever node leads after this many seconds
        #[arg(long)]
        crash_leader_after_secs: Option<u64>,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Args)]
struct ClusterArgs {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of nodes (ids 1..=N)
    #[arg(short, long)]
    nodes: Option<u64>,

    /// Driver tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Lower bound of the election timeout in milliseconds
    #[arg(long)]
    timeout_min_ms: Option<u64>,

    /// Upper bound (inclusive) of the election timeout in milliseconds
    #[arg(long)]
    timeout_max_ms: Option<u64>,

    /// Disable voluntary leader rotation
    #[arg(long)]
    no_rotation: bool,

    /// Seed for election timeouts and message mistreatment
    #[arg(long)]
    seed: Option<u64>,
}

impl ClusterArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        if let Some(min) = self.timeout_min_ms {
            config.election_timeout_min_ms = min;
        }
        if let Some(max) = self.timeout_max_ms {
            config.election_timeout_max_ms = max;
        }
        if self.no_rotation {
            config.rotation = None;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate().context("invalid cluster configuration")?;
        Ok(config)
    }
}

fn print_statuses(statuses: &[NodeStatus]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(statuses)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&Config::default())?);
        }
        Command::Simulate {
            cluster,
            rounds,
            crash_leader_at,
            shuffle,
            duplicate_probability,
        } => {
            let config = cluster.into_config()?;
            info!(
                "Simulating {} nodes for {rounds} rounds (seed {})",
                config.nodes,
                config.seed.unwrap_or_default()
            );

            let mut sim = Simulation::from_config(&config)?.with_policy(DeliveryPolicy {
                shuffle,
                duplicate_probability,
            });

            for round in 1..=rounds {
                if crash_leader_at == Some(round) {
                    match sim.leaders().first() {
                        Some(&leader) => {
                            sim.crash(leader);
                        }
                        None => warn!("No leader to crash at round {round}"),
                    }
                }
                sim.step();
                info!("------------------------- round {round} -------------------------");
            }

            print_statuses(&sim.statuses())?;
        }
        Command::Run {
            cluster,
            duration_secs,
            crash_leader_after_secs,
        } => {
            let config = cluster.into_config()?;
            let mut cluster = LocalCluster::start(config)?;
            let total = Duration::from_secs(duration_secs);

            match crash_leader_after_secs.map(Duration::from_secs) {
                Some(crash_after) if crash_after < total => {
                    sleep(crash_after).await;
                    match cluster.leaders().first() {
                        Some(&leader) => {
                            cluster.crash(leader);
                        }
                        None => warn!("No leader to crash after {crash_after:?}"),
                    }
                    sleep(total - crash_after).await;
                }
                _ => sleep(total).await,
            }

            cluster.shutdown();
            print_statuses(&cluster.statuses())?;
        }
    }

    Ok(())
}
