pub mod balance;
pub mod draw;
pub mod event;
pub mod jobs;
pub mod lottery;
pub mod worker;

pub use balance::{handle_balance_command, BalanceCommands};
pub use draw::{handle_draw_command, DrawCommands};
pub use event::{handle_event_command, EventCommands};
pub use jobs::{handle_jobs_command, JobsCommands};
pub use lottery::{handle_lottery_command, LotteryCommands};
pub use worker::{handle_worker_command, WorkerCommands};
