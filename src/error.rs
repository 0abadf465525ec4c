use thiserror::Error;

/// Errors surfaced synchronously to direct callers of the orchestrator.
///
/// Everything that goes wrong inside the asynchronous workflow body is
/// recorded into the run's persisted state instead of being thrown; only
/// validation and lookup failures ever reach a caller as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input on run start (unknown browser, unknown test type, empty URL).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown run id.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external collaborator (generation service, remote executor) failed.
    #[error("external service error: {0}")]
    External(String),

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}
