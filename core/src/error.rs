use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcctError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Accounting store lock poisoned")]
    StoreLockPoisoned,

    #[error("Failed to persist accounting state to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AcctResult<T> = Result<T, AcctError>;

/// Failure to obtain a raw snapshot for one node.
/// Absorbed by the cycle: the node is skipped, its records stay untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("exporter answered with HTTP status {code}")]
    Status { code: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,
}
