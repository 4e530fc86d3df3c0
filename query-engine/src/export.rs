use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::{
        log_entry::{LogEntry, LogQueryFilters, Page, MAX_QUERY_LIMIT},
        log_level::LogLevel,
    },
};

use crate::query::QueryEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Filter set plus output shape for a bulk export. Unlike
/// `query`, export has no page size cap visible to the caller -- every
/// matching row is materialized, paged internally in `MAX_QUERY_LIMIT`
/// chunks.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub format: Option<ExportFormat>,
}

const CSV_COLUMNS: [&str; 11] = [
    "seq",
    "project_id",
    "received_at",
    "timestamp",
    "level",
    "service",
    "message",
    "correlation_id",
    "tags",
    "issue_type",
    "severity_score",
];

fn to_filters(project_id: &str, options: &ExportOptions) -> LogQueryFilters {
    LogQueryFilters {
        project_id: Some(project_id.to_string()),
        service: options.service.clone(),
        level: options.level,
        from: options.from,
        to: options.to,
        search: options.search.clone(),
        metadata_equals: Default::default(),
    }
}

/// Fetches every entry matching `options` across as many `MAX_QUERY_LIMIT`
/// pages as needed, then renders it as a flat JSON array or CSV document.
/// A page returning fewer rows than the page size ends the sweep.
pub async fn export(
    engine: &QueryEngine,
    project_id: &str,
    options: ExportOptions,
) -> Result<Vec<u8>, AppError> {
    let filters = to_filters(project_id, &options);
    let mut all_entries = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = Page::new(MAX_QUERY_LIMIT, offset);
        let batch = engine.query(project_id, filters.clone(), page).await?;
        let fetched = batch.len();
        all_entries.extend(batch);

        if (fetched as u32) < MAX_QUERY_LIMIT {
            break;
        }
        offset += MAX_QUERY_LIMIT;
    }

    match options.format.unwrap_or(ExportFormat::Json) {
        ExportFormat::Json => render_json(&all_entries),
        ExportFormat::Csv => render_csv(&all_entries),
    }
}

fn render_json(entries: &[LogEntry]) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(entries).map_err(|e| AppError::InternalError(e.to_string()))
}

fn render_csv(entries: &[LogEntry]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    for entry in entries {
        let tags = entry
            .tags
            .as_ref()
            .map(|t| serde_json::to_string(t).unwrap_or_default())
            .unwrap_or_default();
        let severity = entry.severity_score.map(|s| s.to_string()).unwrap_or_default();

        writer
            .write_record([
                entry.seq.to_string(),
                entry.project_id.clone(),
                entry.received_at.to_rfc3339(),
                entry.timestamp.to_rfc3339(),
                entry.level.as_str().to_string(),
                entry.service.clone(),
                entry.message.clone(),
                entry.correlation_id.clone().unwrap_or_default(),
                tags,
                entry.issue_type.clone().unwrap_or_default(),
                severity,
            ])
            .map_err(|e| AppError::InternalError(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| AppError::InternalError(e.to_string()))
}
