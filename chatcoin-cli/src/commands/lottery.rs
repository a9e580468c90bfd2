use anyhow::Result;
use chatcoin_core::EconomyEngine;
use chrono::{Duration, Utc};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};

#[derive(Subcommand)]
pub enum LotteryCommands {
    /// Create a new lottery
    Create {
        /// Display title
        title: String,
        /// Coin cost per ticket
        #[arg(long, default_value_t = 20)]
        cost: i64,
        /// Per-user ticket cap
        #[arg(long, default_value_t = 100)]
        cap: i64,
        /// Close entries this many minutes from now (open-ended when omitted)
        #[arg(long)]
        closes_in: Option<i64>,
    },
    /// List lotteries
    List,
    /// List ticket entries for a lottery
    Entries {
        /// Lottery id
        lottery: String,
    },
    /// Buy tickets
    Buy {
        /// Lottery id
        lottery: String,
        /// Buyer user id
        user: String,
        /// Tickets to buy
        #[arg(default_value_t = 1)]
        quantity: i64,
    },
}

pub async fn handle_lottery_command(cmd: LotteryCommands, engine: &EconomyEngine) -> Result<()> {
    match cmd {
        LotteryCommands::Create {
            title,
            cost,
            cap,
            closes_in,
        } => {
            let closes_at = closes_in.map(|minutes| Utc::now() + Duration::minutes(minutes));
            let lottery = engine.create_lottery(&title, cost, cap, closes_at).await?;

            println!("Created lottery '{}' with ID: {}", title, lottery.id);
            println!("  Ticket cost: {} coins, per-user cap: {}", cost, cap);
            if let Some(closes) = lottery.closes_at {
                println!("  Entries close at {}", closes.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        LotteryCommands::List => {
            let lotteries = engine.list_lotteries().await?;
            if lotteries.is_empty() {
                println!("No lotteries");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["ID", "Title", "Cost", "Cap", "Closes", "Drawn"]);

            for lottery in lotteries {
                table.add_row(vec![
                    lottery.id.clone(),
                    lottery.title.clone(),
                    lottery.unit_cost.to_string(),
                    lottery.per_user_cap.to_string(),
                    lottery
                        .closes_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "open".to_string()),
                    if lottery.drawn { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }

        LotteryCommands::Entries { lottery } => {
            let entries = engine.ticket_entries(&lottery).await?;
            if entries.is_empty() {
                println!("No ticket entries for lottery {}", lottery);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Entry", "User", "Tickets", "First bought"]);

            let mut total = 0i64;
            for entry in &entries {
                total += entry.ticket_count;
                table.add_row(vec![
                    entry.id.to_string(),
                    entry.user_id.clone(),
                    entry.ticket_count.to_string(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]);
            }
            println!("{table}");
            println!("Total tickets: {}", total);
        }

        LotteryCommands::Buy {
            lottery,
            user,
            quantity,
        } => {
            let purchase = engine.purchase(&user, &lottery, quantity).await?;
            println!(
                "Bought {} tickets for {} coins; '{}' now holds {} tickets and {} coins",
                purchase.quantity,
                purchase.cost,
                user,
                purchase.ticket_count,
                purchase.new_balance
            );
        }
    }

    Ok(())
}
