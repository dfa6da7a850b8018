use thiserror::Error;

/// Failure reported by an event log or challenge store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Read or write against the backing store failed. Never retried inside the engine.
    #[error("store unavailable: {0}")]
    Transient(String),

    /// The store refused the write, e.g. completing a task that does not exist.
    #[error("rejected by store: {0}")]
    Rejected(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Transient(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed event {id}: {reason}")]
    MalformedEvent { id: i64, reason: String },

    #[error("invariant violated for user {user_id}: {detail}")]
    InvariantViolation { user_id: String, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
