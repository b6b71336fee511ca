//! `busctl` — operator CLI for inspecting and nudging the action bus.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{dlq::DlqCommands, queue::QueueCommands, task::TaskCommands};

#[derive(Debug, Parser)]
#[command(name = "busctl", about = "Inspect action-bus queues and dead letters")]
struct Cli {
    #[arg(long, env = "BUS_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dead-letter queue inspection and requeueing.
    #[command(subcommand)]
    Dlq(DlqCommands),
    /// Action queue inspection.
    #[command(subcommand)]
    Queue(QueueCommands),
    /// Task record lookup.
    #[command(subcommand)]
    Task(TaskCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Dlq(command) => commands::dlq::run(command, &cli.redis_url).await,
        Commands::Queue(command) => commands::queue::run(command, &cli.redis_url).await,
        Commands::Task(command) => commands::task::run(command, &cli.redis_url).await,
    }
}
