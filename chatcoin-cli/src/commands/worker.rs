use anyhow::Result;
use chatcoin_core::EconomyEngine;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Run a reward worker until Ctrl-C
    Run,
    /// Process the queue once and exit
    Drain,
}

pub async fn handle_worker_command(cmd: WorkerCommands, engine: &EconomyEngine) -> Result<()> {
    match cmd {
        WorkerCommands::Run => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle = engine.spawn_worker(shutdown_rx);

            println!("Reward worker running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;

            let _ = shutdown_tx.send(true);
            let _ = handle.await;
            println!("Worker stopped");
        }

        WorkerCommands::Drain => {
            let processed = engine.process_pending().await?;
            println!("Processed {} award jobs", processed);
        }
    }

    Ok(())
}
