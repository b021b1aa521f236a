use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("command is required")]
    MissingCommand,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid job state")]
    InvalidState,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
