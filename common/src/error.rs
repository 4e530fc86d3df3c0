use thiserror::Error;
use tokio::task::JoinError;

/// Internal error type shared across the ingestion, query and alert crates.
///
/// This is never sent to clients directly; the HTTP boundary in
/// `ingestion-api` maps each variant to a stable, machine-readable error
/// kind and status code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Batch is empty")]
    BatchEmpty,
    #[error("Batch exceeds maximum size of {max} entries (got {actual})")]
    BatchTooLarge { max: usize, actual: usize },
    #[error("Entry {index} invalid: field '{field}': {reason}")]
    EntryInvalid {
        index: usize,
        field: String,
        reason: String,
    },
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Missing credential")]
    MissingCredential,
    #[error("Invalid credential")]
    InvalidCredential,
    #[error("Project is deactivated")]
    ProjectDeactivated,
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Storage temporarily unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
