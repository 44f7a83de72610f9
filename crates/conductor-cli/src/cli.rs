use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "conductor", version, about = "Run and inspect universe operations")]
pub struct Cli {
    /// Config file. Defaults to ./conductor.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a rolling operation against a simulated universe.
    Run(RunArgs),
    /// Print how each operation type is treated by admission control.
    Operations,
    /// Print the actions each node state permits.
    NodeActions,
    /// Print the effective configuration.
    Config,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Operation type, e.g. RestartUniverse or GFlagsUpgrade.
    #[arg(long, default_value = "RestartUniverse")]
    pub operation: String,

    #[arg(long, default_value_t = 3)]
    pub nodes: usize,

    /// Per-step simulated work, in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub step_ms: u64,

    /// Make the start step of this node (0-based) fail.
    #[arg(long)]
    pub fail_node: Option<usize>,

    /// Abort the task this many milliseconds after submission.
    #[arg(long)]
    pub abort_after_ms: Option<u64>,

    /// Run the operation a second time as a re-run of the first if it failed.
    #[arg(long)]
    pub rerun: bool,
}
