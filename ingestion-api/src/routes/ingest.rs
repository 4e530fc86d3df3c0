use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
    Json,
};
use ingestion_pipeline::CredentialSource;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

fn credential_source(headers: &HeaderMap) -> Option<CredentialSource<'_>> {
    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(CredentialSource::ApiKey(api_key));
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|bearer| CredentialSource::Bearer(bearer.trim()))
}

/// `POST /api/logs/batch`. Authentication happens inside
/// `IngestionPipeline::handle_batch` as part of its own
/// parse-authenticate-validate-persist-announce state machine, so no
/// separate auth middleware runs in front of this route.
pub async fn ingest_batch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credential = credential_source(&headers);
    let outcome = state.pipeline.handle_batch(&body, credential).await?;

    Ok(Json(json!({
        "inserted": outcome.accepted,
        "project_id": outcome.project_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn api_key_header_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("x-api-key", HeaderValue::from_static("def"));
        match credential_source(&headers) {
            Some(CredentialSource::ApiKey(token)) => assert_eq!(token, "def"),
            other => panic!("expected api key, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        match credential_source(&headers) {
            Some(CredentialSource::Bearer(token)) => assert_eq!(token, "abc"),
            other => panic!("expected bearer token, got {other:?}"),
        }
    }

    #[test]
    fn absent_headers_yield_none() {
        assert!(credential_source(&HeaderMap::new()).is_none());
    }
}
