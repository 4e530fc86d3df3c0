use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use common::storage::types::project::Project;

use crate::{api_state::ApiState, error::ApiError};

/// Resolves the caller's project from `X-API-Key` (checked first) or
/// `Authorization: Bearer`, attaching it to the request for downstream
/// handlers.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = extract_credential(&request).ok_or(ApiError::MissingCredential)?;

    let project = Project::find_by_token(&state.db, &credential)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::InvalidCredential)?;

    request.extensions_mut().insert(project);

    Ok(next.run(request).await)
}

fn extract_credential(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .map(str::trim)
                .map(str::to_string)
        })
}
