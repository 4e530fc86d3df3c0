use std::collections::HashSet;

use chrono::{Duration, Utc};
use common::{error::AppError, storage::types::log_entry::LogEntry};
use serde::{Deserialize, Serialize};

use crate::query::QueryEngine;

/// Aggregate view over a correlation context: the set of entries sharing
/// a correlation identifier, summarized rather than listed.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CorrelationMetadata {
    pub total_logs: i64,
    pub services: Vec<String>,
    pub trace_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CorrelationCountRow {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct CorrelationIdRow {
    correlation_id: Option<String>,
}

/// Either the promoted `correlation_id` column or the legacy
/// `metadata.correlation_id` key may hold the match -- union the two,
/// never migrate silently.
const UNION_WHERE: &str = "(correlation_id = $cid OR metadata.correlation_id = $cid)";

impl QueryEngine {
    /// Entries sharing `correlation_id` across services, newest first.
    pub async fn get_correlated(
        &self,
        correlation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LogEntry>, AppError> {
        let sql = format!(
            "SELECT * FROM log_entry WHERE {UNION_WHERE} \
             ORDER BY received_at DESC, seq DESC LIMIT $limit START $offset;"
        );
        let mut response = self
            .db()
            .client
            .query(sql)
            .bind(("cid", correlation_id.to_string()))
            .bind(("limit", limit.clamp(1, 1000)))
            .bind(("offset", offset))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_correlation_count(&self, correlation_id: &str) -> Result<i64, AppError> {
        let sql = format!("SELECT count() AS count FROM log_entry WHERE {UNION_WHERE} GROUP ALL;");
        let mut response =
            self.db().client.query(sql).bind(("cid", correlation_id.to_string())).await?;
        let rows: Vec<CorrelationCountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count))
    }

    /// Distinct correlation identifiers (either path) seen in the last
    /// `minutes`, capped at `limit`.
    pub async fn get_recent_correlations(
        &self,
        minutes: i64,
        limit: u32,
    ) -> Result<Vec<String>, AppError> {
        let since = Utc::now() - Duration::minutes(minutes);
        let mut response = self
            .db()
            .client
            .query(
                "SELECT correlation_id FROM log_entry \
                 WHERE received_at >= $since AND correlation_id != NONE;",
            )
            .query(
                "SELECT metadata.correlation_id AS correlation_id FROM log_entry \
                 WHERE received_at >= $since AND metadata.correlation_id != NONE;",
            )
            .bind(("since", since))
            .await?;

        let promoted: Vec<CorrelationIdRow> = response.take(0)?;
        let embedded: Vec<CorrelationIdRow> = response.take(1)?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in promoted.into_iter().chain(embedded) {
            let Some(cid) = row.correlation_id else { continue };
            if seen.insert(cid.clone()) {
                out.push(cid);
                if out.len() as u32 >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Aggregate metadata for one correlation identifier: total entries,
    /// the distinct services involved, and any `trace_id` values carried in
    /// entry metadata.
    pub async fn get_correlation_metadata(
        &self,
        correlation_id: &str,
    ) -> Result<CorrelationMetadata, AppError> {
        let entries = self.get_correlated(correlation_id, 1000, 0).await?;

        let mut services = HashSet::new();
        let mut trace_ids = HashSet::new();
        for entry in &entries {
            services.insert(entry.service.clone());
            if let Some(metadata) = &entry.metadata {
                if let Some(trace_id) = metadata.get("trace_id").and_then(|v| v.as_str()) {
                    trace_ids.insert(trace_id.to_string());
                }
            }
        }

        Ok(CorrelationMetadata {
            total_logs: entries.len() as i64,
            services: services.into_iter().collect(),
            trace_ids: trace_ids.into_iter().collect(),
        })
    }
}
