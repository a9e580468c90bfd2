use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: need {need} coins, have {available}")]
    InsufficientBalance { need: i64, available: i64 },

    #[error("Ticket limit exceeded: cap is {cap}, total would be {requested}")]
    LimitExceeded { cap: i64, requested: i64 },

    #[error("Item closed for entry: {0}")]
    ItemClosed(String),

    #[error("Lottery not found: {0}")]
    LotteryNotFound(String),

    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Job failed permanently: {0}")]
    JobFailed(String),

    #[error("Client disconnected: {0}")]
    ClientDisconnect(String),

    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn item_closed(msg: impl Into<String>) -> Self {
        Self::ItemClosed(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn client_disconnect(msg: impl Into<String>) -> Self {
        Self::ClientDisconnect(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is worth retrying and counts against the
    /// circuit breaker. Business-rule rejections and validation errors
    /// are final; so are client disconnects.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

// Busy and locked conditions are retryable contention, everything else
// from the store is a real storage fault.
impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                CoreError::Transient(err.to_string())
            }
            _ => CoreError::Storage(err),
        }
    }
}
