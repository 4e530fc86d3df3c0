use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            log_entry::{EntryStats, LogEntry, LogQueryFilters, Page, MAX_QUERY_LIMIT},
            log_level::LogLevel,
        },
    },
};
use serde::Deserialize;

/// One row of `find_top_messages` -- a message text, how often it occurred
/// in the evaluated window, and when it was last seen.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopMessage {
    pub message: String,
    pub count: i64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TopMessageRow {
    message: String,
    count: i64,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    service: String,
}

const MAX_TOP_MESSAGES: u32 = 100;

/// Read surface over the entry store: project-scoped filtered queries,
/// histograms, and the "frequent errors" panel. Every method takes
/// `project_id` as an explicit parameter rather than trusting a caller-built
/// `LogQueryFilters` so a caller cannot accidentally omit tenant scoping --
/// the filter's `project_id` field is always overwritten with it.
pub struct QueryEngine {
    db: Arc<SurrealDbClient>,
}

impl QueryEngine {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }

    pub async fn query(
        &self,
        project_id: &str,
        mut filters: LogQueryFilters,
        page: Page,
    ) -> Result<Vec<LogEntry>, AppError> {
        filters.project_id = Some(project_id.to_string());
        LogEntry::query(&self.db, &filters, page).await
    }

    pub async fn get_by_id(&self, seq: i64) -> Result<Option<LogEntry>, AppError> {
        LogEntry::get_by_seq(&self.db, seq).await
    }

    pub async fn stats(&self, project_id: &str) -> Result<EntryStats, AppError> {
        LogEntry::stats(&self.db, Some(project_id)).await
    }

    /// Distinct service names a project has ever logged under.
    pub async fn find_all_services(&self, project_id: &str) -> Result<Vec<String>, AppError> {
        let mut response = self
            .db
            .client
            .query("SELECT service FROM log_entry WHERE project_id = $project_id GROUP BY service;")
            .bind(("project_id", project_id.to_string()))
            .await?;
        let rows: Vec<ServiceRow> = response.take(0)?;
        Ok(rows.into_iter().map(|r| r.service).collect())
    }

    pub async fn count_by_service_and_level(
        &self,
        project_id: &str,
        service: &str,
        level: LogLevel,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError> {
        let mut clauses = vec![
            "project_id = $project_id".to_string(),
            "service = $service".to_string(),
            "level = $level".to_string(),
        ];
        if from.is_some() {
            clauses.push("received_at >= $from".to_string());
        }
        if to.is_some() {
            clauses.push("received_at <= $to".to_string());
        }
        let sql = format!(
            "SELECT count() AS count FROM log_entry WHERE {} GROUP ALL;",
            clauses.join(" AND ")
        );

        let mut query = self
            .db
            .client
            .query(sql)
            .bind(("project_id", project_id.to_string()))
            .bind(("service", service.to_string()))
            .bind(("level", level.as_str()));
        if let Some(from) = from {
            query = query.bind(("from", from));
        }
        if let Some(to) = to {
            query = query.bind(("to", to));
        }

        let mut response = query.await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count))
    }

    /// Most frequent messages for `(project, service, level)` within the
    /// last `window`, newest-last-seen included. Feeds the alert engine's
    /// "frequent errors" correlation and the operator panel of the same
    /// name; `limit` is clamped to 100.
    pub async fn find_top_messages(
        &self,
        project_id: &str,
        service: &str,
        level: LogLevel,
        window: Duration,
        limit: u32,
    ) -> Result<Vec<TopMessage>, AppError> {
        let since = Utc::now() - window;
        let limit = limit.clamp(1, MAX_TOP_MESSAGES).min(MAX_QUERY_LIMIT);

        let mut response = self
            .db
            .client
            .query(
                "SELECT message, count() AS count, time::max(received_at) AS last_seen \
                 FROM log_entry \
                 WHERE project_id = $project_id AND service = $service AND level = $level \
                   AND received_at >= $since \
                 GROUP BY message \
                 ORDER BY count DESC \
                 LIMIT $limit;",
            )
            .bind(("project_id", project_id.to_string()))
            .bind(("service", service.to_string()))
            .bind(("level", level.as_str()))
            .bind(("since", since))
            .bind(("limit", limit))
            .await?;

        let rows: Vec<TopMessageRow> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| TopMessage { message: r.message, count: r.count, last_seen: r.last_seen })
            .collect())
    }
}
