use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "logsync",
    about = "Replicate a document store through append-only logs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with sync settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an in-memory replication demo
    Demo(DemoArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Number of replicas, each owning one log
    #[arg(long, default_value_t = 3)]
    pub logs: usize,

    /// Seconds to wait for the replicas to converge
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}
