use thiserror::Error;

pub type Result<T> = std::result::Result<T, LotteryError>;

#[derive(Error, Debug)]
pub enum LotteryError {
    #[error("Chatcoin core error: {0}")]
    Core(#[from] chatcoin_core::CoreError),

    #[error("Lottery not found: {0}")]
    NotFound(String),

    #[error("Lottery already drawn: {0}")]
    AlreadyDrawn(String),

    #[error("No entries to draw from")]
    NoEntries,

    #[error("Invalid winner count: {0}")]
    InvalidWinnerCount(String),

    #[error("No draw record for lottery: {0}")]
    DrawNotFound(String),

    #[error("Draw verification failed: {0}")]
    VerificationFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
