//! Pregel command line.
//!
//! Provides the `pregel` binary:
//! - `run` loads or generates a graph, runs one of the reference
//!   computations on it and prints the result as JSON
//! - `generate` writes a seeded random graph as an edge list
//!
//! Exit codes: 0 = success, 1 = run failed, 2 = invalid configuration or
//! arguments, 3 = I/O, parse or graph allocation error.

mod algorithms;

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pregel_core::{edge_list, generate, CoreError, CsrGraph, CsrGraphBuilder, Graph, NodeId};
use pregel_runtime::{
    CombinerKind, Computation, InitialActive, LoggingProgress, NoopProgress, Pregel,
    PregelConfig, PregelError, ProgressTracker, SuperstepStats, Termination,
};

use crate::algorithms::{Components, PageRank, ShortestPaths};

/// Bulk-synchronous parallel graph computations.
#[derive(Parser)]
#[command(name = "pregel", about = "Bulk-synchronous parallel graph computations")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG
    /// takes precedence when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a computation and print its result as JSON.
    Run(RunArgs),

    /// Write a random graph as an edge list.
    Generate {
        #[arg(short, long)]
        nodes: u64,

        /// Outgoing relationships per node.
        #[arg(short, long, default_value_t = 4)]
        degree: usize,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Draw relationship weights from [1, 10).
        #[arg(long)]
        weighted: bool,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Edge list to load.
    #[arg(long, conflicts_with = "random", required_unless_present = "random")]
    edges: Option<PathBuf>,

    /// Generate a random graph with this many nodes instead of loading one.
    #[arg(long)]
    random: Option<u64>,

    /// Outgoing relationships per node of a generated graph.
    #[arg(long, default_value_t = 4)]
    degree: usize,

    /// Seed of a generated graph.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(short, long, value_enum, default_value_t = Algorithm::Components)]
    algorithm: Algorithm,

    /// Source node for `sssp`.
    #[arg(long, default_value_t = 0)]
    source: u64,

    /// Worker threads (default: number of CPUs).
    #[arg(short, long)]
    concurrency: Option<usize>,

    #[arg(short = 'i', long)]
    max_iterations: Option<u32>,

    /// Add the reverse of every loaded relationship.
    #[arg(long)]
    undirected: bool,

    /// Run configuration as a JSON object. Command line flags override it.
    #[arg(long)]
    config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    /// Weakly connected components.
    Components,
    Pagerank,
    /// Single-source shortest paths.
    Sssp,
}

impl Algorithm {
    fn as_str(self) -> &'static str {
        match self {
            Algorithm::Components => "components",
            Algorithm::Pagerank => "pagerank",
            Algorithm::Sssp => "sssp",
        }
    }

    fn combiner(self) -> CombinerKind {
        match self {
            Algorithm::Components | Algorithm::Sssp => CombinerKind::Min,
            Algorithm::Pagerank => CombinerKind::Sum,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid --config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] CoreError),

    #[error(transparent)]
    Run(#[from] PregelError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Run(PregelError::Configuration { .. }) => 2,
            CliError::Run(_) => 1,
            CliError::Graph(_) | CliError::Io(_) => 3,
        }
    }
}

/// JSON document printed by `pregel run`.
#[derive(Debug, Serialize)]
struct RunReport<V> {
    algorithm: &'static str,
    ran_iterations: u32,
    did_converge: bool,
    termination: Termination,
    supersteps: Vec<SuperstepStats>,
    values: Vec<V>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Run(args) => run(&args, cli.verbose > 0).map(|json| println!("{json}")),
        Commands::Generate {
            nodes,
            degree,
            seed,
            weighted,
            output,
        } => generate_graph(nodes, degree, seed, weighted, output),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        process::exit(err.exit_code());
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Executes `pregel run`, returning the pretty-printed report.
fn run(args: &RunArgs, log_progress: bool) -> Result<String, CliError> {
    let graph = load_graph(args)?;
    let config = run_config(args)?;
    let progress: Arc<dyn ProgressTracker> = if log_progress {
        Arc::new(LoggingProgress::new(args.algorithm.as_str()))
    } else {
        Arc::new(NoopProgress)
    };

    let algorithm = args.algorithm.as_str();
    let json = match args.algorithm {
        Algorithm::Components => {
            to_json(execute(&graph, Components, config, progress, algorithm)?)?
        }
        Algorithm::Pagerank => {
            to_json(execute(&graph, PageRank::default(), config, progress, algorithm)?)?
        }
        Algorithm::Sssp => {
            let computation = ShortestPaths {
                source: NodeId(args.source),
            };
            to_json(execute(&graph, computation, config, progress, algorithm)?)?
        }
    };
    Ok(json)
}

fn to_json<V: Serialize>(report: RunReport<V>) -> Result<String, CliError> {
    serde_json::to_string_pretty(&report).map_err(|e| CliError::Io(e.into()))
}

fn load_graph(args: &RunArgs) -> Result<CsrGraph, CliError> {
    // Components are weak: follow relationships in both directions.
    let undirected = args.undirected || args.algorithm == Algorithm::Components;
    let graph = match (&args.edges, args.random) {
        (Some(path), _) => edge_list::read_file(path, undirected)?,
        (None, Some(nodes)) => {
            let generated = if args.algorithm == Algorithm::Sssp {
                generate::random_weighted_graph(nodes, args.degree, args.seed)?
            } else {
                generate::random_graph(nodes, args.degree, args.seed)?
            };
            if undirected {
                mirror(&generated)?
            } else {
                generated
            }
        }
        (None, None) => {
            return Err(PregelError::Configuration {
                reason: "either --edges or --random is required".to_string(),
            }
            .into())
        }
    };
    info!(
        nodes = graph.node_count(),
        relationships = graph.relationship_count(),
        "graph loaded"
    );
    Ok(graph)
}

/// Copies `graph` adding the reverse of every relationship.
fn mirror(graph: &CsrGraph) -> Result<CsrGraph, CoreError> {
    let mut builder = CsrGraphBuilder::new(graph.node_count()).undirected();
    for node in (0..graph.node_count()).map(NodeId) {
        match graph.weights(node) {
            Some(weights) => {
                for (&target, &weight) in graph.neighbors(node).iter().zip(weights) {
                    builder.add_weighted_relationship(node, target, weight)?;
                }
            }
            None => {
                for &target in graph.neighbors(node) {
                    builder.add_relationship(node, target)?;
                }
            }
        }
    }
    builder.build()
}

/// Builds the run configuration: `--config` first, then flags, then what
/// the algorithm requires.
fn run_config(args: &RunArgs) -> Result<PregelConfig, CliError> {
    let mut config = match &args.config {
        Some(json) => serde_json::from_str::<PregelConfig>(json)?,
        None => PregelConfig::default(),
    };
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    config.combiner = args.algorithm.combiner();
    if args.algorithm == Algorithm::Sssp {
        config.initial_active = InitialActive::Nodes(vec![NodeId(args.source)]);
    }
    Ok(config)
}

fn execute<C>(
    graph: &CsrGraph,
    computation: C,
    config: PregelConfig,
    progress: Arc<dyn ProgressTracker>,
    algorithm: &'static str,
) -> Result<RunReport<C::Value>, PregelError>
where
    C: Computation<CsrGraph>,
{
    let result = Pregel::new(graph, config, computation)?
        .with_progress(progress)
        .run()?;
    Ok(RunReport {
        algorithm,
        ran_iterations: result.ran_iterations,
        did_converge: result.did_converge,
        termination: result.termination,
        supersteps: result.supersteps,
        values: result.node_values.into_vec(),
    })
}

/// Executes `pregel generate`.
fn generate_graph(
    nodes: u64,
    degree: usize,
    seed: u64,
    weighted: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let graph = if weighted {
        generate::random_weighted_graph(nodes, degree, seed)?
    } else {
        generate::random_graph(nodes, degree, seed)?
    };
    match output {
        Some(path) => edge_list::write_file(&graph, &path)?,
        None => edge_list::write(&graph, io::stdout().lock())?,
    }
    Ok(())
}
