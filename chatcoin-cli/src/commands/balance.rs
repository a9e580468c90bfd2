use anyhow::Result;
use chatcoin_core::EconomyEngine;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};

#[derive(Subcommand)]
pub enum BalanceCommands {
    /// Show a user's coin balance
    Show {
        /// User id
        user: String,
    },
    /// Show a user's ledger history
    History {
        /// User id
        user: String,
    },
    /// Credit coins to a user outside the chat pipeline
    Grant {
        /// User id
        user: String,
        /// Coins to credit
        amount: i64,
    },
}

pub async fn handle_balance_command(cmd: BalanceCommands, engine: &EconomyEngine) -> Result<()> {
    match cmd {
        BalanceCommands::Show { user } => {
            let reading = engine.get_balance(&user).await?;
            if reading.degraded {
                println!(
                    "Balance for '{}': {} coins (degraded read, store unavailable)",
                    user, reading.balance
                );
            } else {
                println!("Balance for '{}': {} coins", user, reading.balance);
            }
        }

        BalanceCommands::History { user } => {
            let entries = engine.ledger(&user).await?;
            if entries.is_empty() {
                println!("No ledger entries for '{}'", user);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Event", "Delta", "Reason", "At"]);

            let mut total = 0i64;
            for entry in &entries {
                total += entry.delta;
                table.add_row(vec![
                    entry.event_id.clone(),
                    entry.delta.to_string(),
                    entry.reason.clone(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]);
            }
            println!("{table}");
            println!("Ledger total: {} coins", total);
        }

        BalanceCommands::Grant { user, amount } => {
            let new_balance = engine.grant(&user, amount).await?;
            println!("Granted {} coins to '{}', balance now {}", amount, user, new_balance);
        }
    }

    Ok(())
}
