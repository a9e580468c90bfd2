//! Deterministic weighted lottery for the chatcoin economy
//!
//! Entries map to contiguous ranges of a ticket index space, winners are
//! picked by hashing a recorded seed, and every draw persists enough
//! state to be independently re-verified.

pub mod draw;
pub mod error;
pub mod ranges;
pub mod rng;

pub use draw::{select_winners, DrawEngine, DrawVerification};
pub use error::{LotteryError, Result};
pub use ranges::{build_entry_ranges, find_entry_for_index, EntryRange};
pub use rng::{deterministic_index, generate_seed};

pub use chatcoin_core::{DrawRecord, SnapshotEntry, WinnerPolicy};
