use anyhow::Result;
use chatcoin_core::EconomyEngine;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};

#[derive(Subcommand)]
pub enum JobsCommands {
    /// Show award jobs frozen after exhausting retries
    Failed,
    /// Show queue totals by status
    Counts,
}

pub async fn handle_jobs_command(cmd: JobsCommands, engine: &EconomyEngine) -> Result<()> {
    match cmd {
        JobsCommands::Failed => {
            let jobs = engine.failed_jobs().await?;
            if jobs.is_empty() {
                println!("No failed jobs");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Job", "Event", "User", "Attempts", "Last error"]);

            for job in jobs {
                table.add_row(vec![
                    job.id.to_string(),
                    job.event_id.clone(),
                    job.user_id.clone(),
                    job.attempts.to_string(),
                    job.last_error.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }

        JobsCommands::Counts => {
            let counts = engine.queue_counts().await?;
            println!("Pending:    {}", counts.pending);
            println!("Processing: {}", counts.processing);
            println!("Completed:  {}", counts.completed);
            println!("Failed:     {}", counts.failed);
        }
    }

    Ok(())
}
