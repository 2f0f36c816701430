use thiserror::Error;

/// Crate-wide error type. Every cross-boundary failure in the execution
/// core surfaces as one of these variants rather than a panic or a bare
/// string, so callers (CLI, future embedders) can match on error kind.
#[derive(Error, Debug)]
pub enum AngelaError {
    /// The safety classifier refused the command outright. Never retried,
    /// no user override exists.
    #[error("refused: {0}")]
    Refusal(String),

    /// The user declined the confirmation prompt.
    #[error("confirmation denied for: {0}")]
    ConfirmationDenied(String),

    /// A shell command or filesystem operation failed at runtime.
    #[error("execution failed: {message}")]
    ExecutionFailure {
        message: String,
        exit_code: Option<i32>,
    },

    /// Timeout elapsed before the child process exited.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// An external cancellation signal terminated the operation.
    #[error("cancelled")]
    Cancelled,

    /// Journal persistence failed. Fatal to the enclosing transaction.
    #[error("journal error: {0}")]
    JournalError(String),

    /// An inverse operation failed while rolling back.
    #[error("rollback error: {0}")]
    RollbackError(String),

    /// The requested operation/transaction id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A filesystem precondition (permissions, existing path, parent dir) failed.
    #[error("filesystem precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AngelaError>;
