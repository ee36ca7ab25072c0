use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use leiden_sweep::{
    Config, Detector, LoadStrategy, Objective, Partitioner, SynthConfig, load_graph, synthesize,
    write_dot, write_edges, write_report,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sweep the Leiden resolution parameter over an edge list")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// TOML config file.
    #[arg(short, long, global = true, env = "LEIDEN_SWEEP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report resolution intervals with a constant community count (default).
    Sweep(SweepArgs),
    /// Generate a synthetic spanning-tree edge list.
    Synth(SynthArgs),
    /// Write the graph as DOT, coloured by community at one resolution.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// Edge list CSV with source,target,weight columns.
    #[arg(short, long, env = "LEIDEN_SWEEP_EDGES")]
    edges: Option<PathBuf>,

    #[arg(long, value_enum)]
    strategy: Option<LoadStrategy>,

    /// Ignore edge weights.
    #[arg(long)]
    unweighted: bool,

    #[arg(long, value_enum)]
    objective: Option<Objective>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    iterations: Option<usize>,
}

impl GraphArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(edges) = &self.edges {
            config.edge_file = edges.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.unweighted {
            config.use_weights = false;
        }
        if let Some(objective) = self.objective {
            config.objective = objective;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
    }
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    graph: GraphArgs,
}

#[derive(Args, Debug)]
struct SynthArgs {
    #[arg(long, default_value_t = 200)]
    documents: usize,

    #[arg(long, default_value_t = 60)]
    topics: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(short, long, default_value = "./temp/mst_edges.csv")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    graph: GraphArgs,

    #[arg(short, long, default_value_t = 0.001)]
    resolution: f64,

    #[arg(short, long, default_value = "graph.dot")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command.unwrap_or(Command::Sweep(cli.sweep)) {
        Command::Sweep(args) => {
            args.graph.apply(&mut config);
            run_sweep(&config)
        }
        Command::Synth(args) => run_synth(&args),
        Command::Export(args) => {
            args.graph.apply(&mut config);
            run_export(&config, args.resolution, &args.out)
        }
    }
}

fn run_sweep(config: &Config) -> Result<()> {
    // 1. Load the graph with transformed weights
    let graph = load_graph(&config.edge_file, config.strategy)
        .with_context(|| format!("failed to load {}", config.edge_file.display()))?;

    // 2. Report graph properties, then sweep, printing each interval as soon as it closes
    let resolutions = config.resolutions()?;
    let detector = Detector::new(&graph, config.leiden());
    let stdout = std::io::stdout();
    write_report(&detector, &resolutions, config.use_weights, &mut stdout.lock())?;

    Ok(())
}

fn run_synth(args: &SynthArgs) -> Result<()> {
    let synth = SynthConfig {
        documents: args.documents,
        topics: args.topics,
        seed: args.seed,
    };
    let edges = synthesize(&synth);

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    write_edges(&args.out, &edges)?;
    info!(path = %args.out.display(), edges = edges.len(), "edge list written");
    Ok(())
}

fn run_export(config: &Config, resolution: f64, out: &Path) -> Result<()> {
    let graph = load_graph(&config.edge_file, config.strategy)
        .with_context(|| format!("failed to load {}", config.edge_file.display()))?;
    let detector = Detector::new(&graph, config.leiden());
    let partition = detector.partition(resolution, config.use_weights)?;

    write_dot(&graph, &partition, out)?;

    println!("Detected {} communities:", partition.community_count());
    for (id, members) in partition.communities().iter().enumerate() {
        println!("Community {} ({} members)", id, members.len());
    }
    Ok(())
}
