use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use common::storage::types::{
    log_entry::{LogQueryFilters, Page},
    log_level::LogLevel,
    project::Project,
};
use query_engine::{export, ExportFormat, ExportOptions};
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    pub service: Option<String>,
    pub level: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

fn parse_level(raw: &Option<String>) -> Result<Option<LogLevel>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => LogLevel::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::MalformedPayload(format!("unknown level '{s}'"))),
    }
}

/// `GET /api/logs`. Scoped to the project resolved by `api_auth` -- the
/// caller's session, not a client-supplied project identifier, decides
/// which tenant's entries are visible.
pub async fn list_logs(
    State(state): State<ApiState>,
    Extension(project): Extension<Project>,
    Query(params): Query<LogQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = LogQueryFilters {
        project_id: None,
        service: params.service,
        level: parse_level(&params.level)?,
        from: params.from,
        to: params.to,
        search: params.search,
        metadata_equals: Default::default(),
    };
    let page = Page::new(params.limit.unwrap_or(100), params.offset.unwrap_or(0));

    let entries = state.query.query(&project.id, filters, page).await?;
    Ok(Json(entries))
}

pub async fn get_log(
    State(state): State<ApiState>,
    Extension(project): Extension<Project>,
    Path(seq): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.query.get_by_id(seq).await? {
        Some(entry) if entry.project_id == project.id => Ok(Json(entry)),
        _ => Err(ApiError::NotFound(format!("log entry {seq}"))),
    }
}

pub async fn log_stats(
    State(state): State<ApiState>,
    Extension(project): Extension<Project>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.query.stats(&project.id).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct CorrelationQueryParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /api/logs/correlated/{correlation_id}`. Correlation traversal is
/// not itself project-scoped in the store (`correlation_id` cuts across
/// services), so the authenticated project only gates access to the
/// route, not the result set.
pub async fn get_correlated(
    State(state): State<ApiState>,
    Extension(_project): Extension<Project>,
    Path(correlation_id): Path<String>,
    Query(params): Query<CorrelationQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(100);
    let offset = params.offset.unwrap_or(0);

    let entries = state.query.get_correlated(&correlation_id, limit, offset).await?;
    let metadata = state.query.get_correlation_metadata(&correlation_id).await?;

    Ok(Json(json!({
        "entries": entries,
        "metadata": metadata,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQueryParams {
    pub format: Option<String>,
    pub service: Option<String>,
    pub level: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

/// `GET /api/logs/export`.
pub async fn export_logs(
    State(state): State<ApiState>,
    Extension(project): Extension<Project>,
    Query(params): Query<ExportQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let format = match params.format.as_deref() {
        None | Some("json") => ExportFormat::Json,
        Some("csv") => ExportFormat::Csv,
        Some(other) => return Err(ApiError::MalformedPayload(format!("unknown export format '{other}'"))),
    };

    let options = ExportOptions {
        service: params.service,
        level: parse_level(&params.level)?,
        from: params.from,
        to: params.to,
        search: params.search,
        format: Some(format),
    };

    let bytes = export(&state.query, &project.id, options).await?;
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv",
    };

    Ok((StatusCode::OK, [(axum::http::header::CONTENT_TYPE, content_type)], bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_rejects_unknown_level_names() {
        let err = parse_level(&Some("panic".to_string())).expect_err("should reject");
        assert!(matches!(err, ApiError::MalformedPayload(_)));
    }

    #[test]
    fn parse_level_accepts_warning_alias() {
        let level = parse_level(&Some("warning".to_string())).expect("should parse");
        assert_eq!(level, Some(LogLevel::Warn));
    }

    #[test]
    fn parse_level_passes_through_absent_filter() {
        assert_eq!(parse_level(&None).expect("should be ok"), None);
    }
}
