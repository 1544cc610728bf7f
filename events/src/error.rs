use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input to an otherwise reachable operation
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced event does not exist
    #[error("event not found")]
    NotFound,

    /// The acting principal is not the event's creator
    #[error("access denied")]
    AccessDenied,

    /// The event is in a state that rejects the operation
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, EventError>;
