use anyhow::Result;
use chatcoin_core::{ChatEvent, EconomyEngine};
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use uuid::Uuid;

#[derive(Subcommand)]
pub enum EventCommands {
    /// Submit a chat message event
    Submit {
        /// Sender user id
        user: String,
        /// Message content
        content: String,
        /// Stream session id
        #[arg(short, long)]
        session: Option<String>,
        /// Event id (generated when omitted; reuse one to test redelivery)
        #[arg(short, long)]
        event_id: Option<String>,
        /// Emote count in the message
        #[arg(long, default_value_t = 0)]
        emotes: u32,
        /// Sender is a subscriber
        #[arg(long)]
        subscriber: bool,
    },
    /// Submit a cheer event
    Cheer {
        /// Sender user id
        user: String,
        /// Cheered amount
        amount: u32,
        /// Stream session id
        #[arg(short, long)]
        session: Option<String>,
        /// Event id (generated when omitted)
        #[arg(short, long)]
        event_id: Option<String>,
    },
    /// Show recent buffered events
    Recent {
        /// Maximum events to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn handle_event_command(cmd: EventCommands, engine: &EconomyEngine) -> Result<()> {
    match cmd {
        EventCommands::Submit {
            user,
            content,
            session,
            event_id,
            emotes,
            subscriber,
        } => {
            let event_id = event_id.unwrap_or_else(|| Uuid::new_v4().to_string());

            let job = engine
                .submit_chat_event(ChatEvent {
                    event_id: event_id.clone(),
                    user_id: user,
                    stream_session_id: session,
                    content,
                    badges: Vec::new(),
                    emote_count: emotes,
                    is_subscriber: subscriber,
                    received_at: Utc::now(),
                })
                .await?;

            println!(
                "Enqueued award job {} for event {} (status: {:?})",
                job.id, event_id, job.status
            );
        }

        EventCommands::Cheer {
            user,
            amount,
            session,
            event_id,
        } => {
            let event_id = event_id.unwrap_or_else(|| Uuid::new_v4().to_string());

            let job = engine
                .submit_cheer_event(&event_id, &user, session.as_deref(), amount)
                .await?;

            println!(
                "Enqueued cheer job {} for event {} (status: {:?})",
                job.id, event_id, job.status
            );
        }

        EventCommands::Recent { limit } => {
            let events = engine.recent_events(limit);
            if events.is_empty() {
                println!("No buffered events");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Event", "User", "Session", "Content", "Received"]);

            for event in events {
                table.add_row(vec![
                    event.event_id.clone(),
                    event.user_id.clone(),
                    event.stream_session_id.clone().unwrap_or_default(),
                    event.content.clone(),
                    event.received_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}
