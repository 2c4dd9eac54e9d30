//! shepherd - run the merge queue and review monitor, and manage the queue

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shepherd")]
#[command(about = "Merge queue and review-cycle monitor for agent-driven pull requests")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/shepherd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the merge queue and review monitor until interrupted
    Run,

    /// Show the merge queue
    Queue {
        /// Only show entries for this project
        #[arg(long)]
        project: Option<String>,
    },

    /// Approve a task's pull request for merge
    Approve {
        /// Task id
        task: String,
    },

    /// Take a task's pull request out of the merge queue
    Remove {
        /// Task id
        task: String,
    },

    /// Move a queue entry to another position
    Reorder {
        /// Queue entry id
        entry: String,
        /// New position (lower runs first)
        #[arg(allow_negative_numbers = true)]
        position: i64,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = cli::CommandContext::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => cli::run_daemon(&ctx).await?,
        Commands::Queue { project } => cli::show_queue(&ctx, project.as_deref()).await?,
        Commands::Approve { task } => cli::approve(&ctx, &task).await?,
        Commands::Remove { task } => cli::remove(&ctx, &task).await?,
        Commands::Reorder { entry, position } => cli::reorder(&ctx, &entry, position).await?,
    }

    Ok(())
}
