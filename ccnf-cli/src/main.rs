use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

mod commands;
mod config;
mod node;
mod utils;

/// CCNF command-line interface: boots a forwarding node and drives it
/// from the outside.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Increase log verbosity to debug
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the bootstrap routes in a node's config file
    Fib {
        #[clap(subcommand)]
        cmd: FibCommands,
    },

    /// Boot a node, send an Interest, and print the matching Data
    Interest {
        /// Name to request
        name: String,

        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,

        /// Timeout in milliseconds
        #[clap(short, long, default_value = "4000")]
        timeout: u64,
    },

    /// Boot a node and serve one piece of content until interrupted
    Publish {
        /// Name to publish under
        name: String,

        /// Content to publish
        content: String,

        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,

        /// Time-to-live in milliseconds
        #[clap(long, default_value = "60000")]
        ttl: u64,
    },

    /// Run a node until interrupted, printing periodic statistics
    Run {
        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,

        /// Statistics printing interval in milliseconds
        #[clap(long, default_value = "5000")]
        stats_interval: u64,
    },

    /// Boot a node, let it settle, and print one statistics snapshot
    Stats {
        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,

        /// How long to let the node run before snapshotting, in milliseconds
        #[clap(long, default_value = "1000")]
        settle_ms: u64,
    },
}

#[derive(Subcommand)]
enum FibCommands {
    /// Add a bootstrap route, pointed at `connect_to[neighbor]`
    Add {
        /// Name prefix
        prefix: String,

        /// Index into the config's `connect_to` list
        neighbor: usize,

        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,
    },

    /// Remove a bootstrap route
    Remove {
        /// Name prefix
        prefix: String,

        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,
    },

    /// Show the bootstrap routes and anchor prefixes in a config file
    Show {
        /// Path to the node's config file
        #[clap(short, long, default_value = "ccnf.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    match cli.command {
        Commands::Fib { cmd } => commands::fib::handle_command(cmd).await,
        Commands::Interest { name, config, timeout } => {
            commands::interest::send_interest(&config, name, Duration::from_millis(timeout)).await
        }
        Commands::Publish { name, content, config, ttl } => {
            commands::publish::publish_content(&config, name, content, Duration::from_millis(ttl)).await
        }
        Commands::Run { config, stats_interval } => {
            commands::run::run_node(&config, Duration::from_millis(stats_interval)).await
        }
        Commands::Stats { config, settle_ms } => {
            commands::stats::print_stats(&config, Duration::from_millis(settle_ms)).await
        }
    }
}
