use axum::{http::StatusCode, response::IntoResponse, Json};
use common::error::AppError;
use serde_json::json;
use thiserror::Error;

/// Wire-facing error kinds, one per row of the HTTP error handling table.
/// `From<AppError>` collapses the internal taxonomy down to these;
/// `project_deactivated` is folded into `invalid_credential` (the registry
/// returns none for an inactive project, so the authenticator cannot
/// distinguish the two) even though `AppError` keeps the variant distinct
/// for callers outside the HTTP boundary.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("batch is empty")]
    BatchEmpty,
    #[error("batch too large: max {max}, got {actual}")]
    BatchTooLarge { max: usize, actual: usize },
    #[error("entry {index} invalid field '{field}': {reason}")]
    EntryInvalid { index: usize, field: String, reason: String },
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("internal error")]
    InternalError,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::MalformedPayload(msg) => Self::MalformedPayload(msg),
            AppError::BatchEmpty => Self::BatchEmpty,
            AppError::BatchTooLarge { max, actual } => Self::BatchTooLarge { max, actual },
            AppError::EntryInvalid { index, field, reason } => Self::EntryInvalid { index, field, reason },
            AppError::MissingCredential => Self::MissingCredential,
            AppError::InvalidCredential | AppError::ProjectDeactivated => Self::InvalidCredential,
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::RateLimitExceeded => Self::RateLimitExceeded,
            AppError::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
            AppError::Database(db_err) => Self::StorageUnavailable(db_err.to_string()),
            other => {
                tracing::error!(error = %other, "unhandled internal error at API boundary");
                Self::InternalError
            }
        }
    }
}

fn error_kind(err: &ApiError) -> &'static str {
    match err {
        ApiError::MalformedPayload(_) => "malformed_payload",
        ApiError::BatchEmpty => "batch_empty",
        ApiError::BatchTooLarge { .. } => "batch_too_large",
        ApiError::EntryInvalid { .. } => "entry_invalid",
        ApiError::MissingCredential => "missing_credential",
        ApiError::InvalidCredential => "invalid_credential",
        ApiError::NotFound(_) => "not_found",
        ApiError::RateLimitExceeded => "rate_limit_exceeded",
        ApiError::StorageUnavailable(_) => "storage_unavailable",
        ApiError::InternalError => "internal_error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::MalformedPayload(_) | Self::BatchEmpty | Self::BatchTooLarge { .. } | Self::EntryInvalid { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            Self::EntryInvalid { index, field, reason } => json!({
                "error": error_kind(&self),
                "index": index,
                "field": field,
                "reason": reason,
            }),
            _ => json!({ "error": error_kind(&self) }),
        };

        (status, Json(body)).into_response()
    }
}
