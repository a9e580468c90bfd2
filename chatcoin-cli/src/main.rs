mod commands;

use chatcoin_core::EconomyEngine;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatcoin")]
#[command(about = "chatcoin - livestream chat engagement economy")]
#[command(version)]
struct Cli {
    /// Data directory for the economy store
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat event commands
    #[command(subcommand)]
    Event(commands::EventCommands),

    /// Balance and ledger commands
    #[command(subcommand)]
    Balance(commands::BalanceCommands),

    /// Lottery management and ticket purchases
    #[command(subcommand)]
    Lottery(commands::LotteryCommands),

    /// Draw and verification commands
    #[command(subcommand)]
    Draw(commands::DrawCommands),

    /// Award job queue inspection
    #[command(subcommand)]
    Jobs(commands::JobsCommands),

    /// Reward worker commands
    #[command(subcommand)]
    Worker(commands::WorkerCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "chatcoin_core={0},chatcoin_lottery={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatcoin")
    });

    tokio::fs::create_dir_all(&data_dir).await?;
    tracing::debug!("Using data directory {}", data_dir.display());

    let engine = EconomyEngine::new(&data_dir).await?;

    match cli.command {
        Commands::Event(cmd) => commands::handle_event_command(cmd, &engine).await?,
        Commands::Balance(cmd) => commands::handle_balance_command(cmd, &engine).await?,
        Commands::Lottery(cmd) => commands::handle_lottery_command(cmd, &engine).await?,
        Commands::Draw(cmd) => commands::handle_draw_command(cmd, &engine).await?,
        Commands::Jobs(cmd) => commands::handle_jobs_command(cmd, &engine).await?,
        Commands::Worker(cmd) => commands::handle_worker_command(cmd, &engine).await?,
    }

    Ok(())
}
