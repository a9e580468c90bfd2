use anyhow::Result;
use chatcoin_core::{EconomyEngine, WinnerPolicy};
use chatcoin_lottery::DrawEngine;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;

#[derive(Subcommand)]
pub enum DrawCommands {
    /// Run a draw and persist its record
    Run {
        /// Lottery id
        lottery: String,
        /// Number of winners
        #[arg(long, default_value_t = 1)]
        winners: usize,
        /// Seed (generated and recorded when omitted)
        #[arg(long)]
        seed: Option<String>,
        /// Let an entry win more than once
        #[arg(long)]
        allow_repeat: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Recompute a draw from its stored seed and snapshot
    Verify {
        /// Lottery id
        lottery: String,
    },
    /// Print the stored draw record as JSON
    Show {
        /// Lottery id
        lottery: String,
    },
}

pub async fn handle_draw_command(cmd: DrawCommands, engine: &EconomyEngine) -> Result<()> {
    let draw_engine = DrawEngine::new(engine.storage());

    match cmd {
        DrawCommands::Run {
            lottery,
            winners,
            seed,
            allow_repeat,
            yes,
        } => {
            let info = engine.lottery(&lottery).await?;

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Draw {} winner(s) for '{}'? Entries close permanently.",
                        winners, info.title
                    ))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Draw cancelled");
                    return Ok(());
                }
            }

            let policy = if allow_repeat {
                WinnerPolicy::AllowRepeat
            } else {
                WinnerPolicy::ExcludeAfterWin
            };

            let record = draw_engine
                .run_draw(&lottery, winners, seed, policy)
                .await?;

            println!("Draw complete for '{}' (seed: {})", info.title, record.seed);

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Ordinal", "Entry", "User", "Tickets held"]);

            for (ordinal, entry_id) in record.winner_entry_ids.iter().enumerate() {
                let entry = record.snapshot.iter().find(|e| e.entry_id == *entry_id);
                table.add_row(vec![
                    ordinal.to_string(),
                    entry_id.to_string(),
                    entry.map(|e| e.user_id.clone()).unwrap_or_default(),
                    entry
                        .map(|e| e.ticket_count.to_string())
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }

        DrawCommands::Verify { lottery } => {
            let verification = draw_engine.verify_draw(&lottery).await?;

            if verification.matches {
                println!(
                    "Draw for lottery {} verified: winners {:?} reproduce from seed {}",
                    lottery, verification.stored_winner_entry_ids, verification.seed
                );
            } else {
                println!(
                    "Draw for lottery {} FAILED verification: stored {:?}, recomputed {:?}",
                    lottery,
                    verification.stored_winner_entry_ids,
                    verification.recomputed_winner_entry_ids
                );
                anyhow::bail!("draw record does not reproduce from its seed");
            }
        }

        DrawCommands::Show { lottery } => {
            let storage = engine.storage();
            let store = chatcoin_core::storage::LotteryStore::new(&storage);
            match store.get_draw(&lottery).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No draw record for lottery {}", lottery),
            }
        }
    }

    Ok(())
}
