use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the memopool binary.
#[derive(Debug, Parser)]
#[command(
    name = "memopool",
    version,
    about = "Memoizing LRU caches and a bounded worker pool, driven by an order batch"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MEMOPOOL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// Subcommand to run; `compare` when none was given.
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Compare(RunArgs::default()))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the batch serially, in parallel, uncached and cached, then summarize.
    Compare(RunArgs),
    /// Run one serial batch through the caches.
    Serial(RunArgs),
    /// Run one batch on the worker pool.
    Parallel(RunArgs),
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Compare(args) | Command::Serial(args) | Command::Parallel(args) => args,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Print the report as JSON instead of text.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    /// Override the number of generated orders.
    #[arg(long = "orders", value_name = "COUNT")]
    pub orders: Option<usize>,

    /// Override the worker thread count.
    #[arg(long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Override the seed used for catalog and order generation.
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Coalesce concurrent misses on the same key.
    #[arg(
        long = "single-flight",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub single_flight: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
