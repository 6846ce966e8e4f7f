use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "boc",
    about = "Bitemporal object cache workbench",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Populate a cache with synthetic versions and time concurrent reads
    Bench(BenchArgs),
    /// Show index statistics before and after a delete-then-rebuild cycle
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct WorkloadArgs {
    /// Distinct objects to write
    #[arg(long, default_value_t = 1_000)]
    pub objects: usize,

    /// Versions written per object
    #[arg(long, default_value_t = 5)]
    pub versions: usize,

    /// Cache configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Random seed for the generated workload
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args)]
pub struct BenchArgs {
    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// Reader threads
    #[arg(long, default_value_t = 4)]
    pub readers: usize,

    /// Lookups per reader thread
    #[arg(long, default_value_t = 10_000)]
    pub reads: usize,
}

#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// Fraction of written versions to delete before rebuilding
    #[arg(long, default_value_t = 0.25)]
    pub deletes: f64,
}
