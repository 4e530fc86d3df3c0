use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    storage::types::{deserialize_flexible_id, log_level::LogLevel},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_METADATA_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_BATCH_SIZE: usize = 1000;
pub const MAX_QUERY_LIMIT: u32 = 1000;

fn serialize_datetime<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    Into::<surrealdb::sql::Datetime>::into(*date).serialize(serializer)
}

fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let dt = surrealdb::sql::Datetime::deserialize(deserializer)?;
    Ok(DateTime::<Utc>::from(dt))
}

/// A single durable observation. `seq` is the monotonic, append-only
/// identifier clients see; `id` is the opaque storage key every
/// `StoredObject` carries and is not exposed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub seq: i64,
    pub project_id: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    pub received_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub service: String,
    pub correlation_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub issue_type: Option<String>,
    pub severity_score: Option<u8>,
    pub insight_built: bool,
}

impl crate::storage::types::StoredObject for LogEntry {
    fn table_name() -> &'static str {
        "log_entry"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

/// One entry as parsed off the wire, prior to stamping and persistence.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub service: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub correlation_id: Option<String>,
}

impl NewLogEntry {
    /// Validates one entry. Returns the offending field name on failure so
    /// the caller can build an `entry_invalid` error carrying `{index, field}`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.message.is_empty() {
            return Err("message");
        }
        if self.message.len() > MAX_MESSAGE_BYTES {
            return Err("message");
        }
        if self.service.trim().is_empty() {
            return Err("service");
        }
        if let Some(metadata) = &self.metadata {
            let size = serde_json::to_vec(metadata).map(|v| v.len()).unwrap_or(usize::MAX);
            if size > MAX_METADATA_BYTES {
                return Err("metadata");
            }
        }
        Ok(())
    }

    fn into_stored(self, project_id: &str, seq: i64, received_at: DateTime<Utc>) -> LogEntry {
        LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            project_id: project_id.to_string(),
            received_at,
            timestamp: self.timestamp.unwrap_or(received_at),
            level: self.level,
            message: self.message,
            service: self.service,
            correlation_id: self.correlation_id,
            metadata: self.metadata,
            tags: self.tags,
            issue_type: None,
            severity_score: None,
            insight_built: false,
        }
    }
}

/// Conjunctive filter set for `query`. Every populated field narrows the
/// result; `None` means "no constraint on this dimension".
#[derive(Debug, Clone, Default)]
pub struct LogQueryFilters {
    pub project_id: Option<String>,
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub metadata_equals: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, MAX_QUERY_LIMIT),
            offset,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryStats {
    pub total: i64,
    pub by_level: HashMap<String, i64>,
    pub by_service: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct GroupCountRow {
    key: String,
    count: i64,
}

#[derive(Debug, Deserialize)]
struct TotalRow {
    count: i64,
}

impl LogEntry {
    /// Builds the WHERE clause and parameter bindings shared by `query`,
    /// `stats`, and the retention sweep's count/delete pair.
    fn filter_clause(filters: &LogQueryFilters) -> (String, Vec<(String, serde_json::Value)>) {
        let mut clauses = Vec::new();
        let mut binds: Vec<(String, serde_json::Value)> = Vec::new();

        if let Some(project_id) = &filters.project_id {
            clauses.push("project_id = $project_id".to_string());
            binds.push(("project_id".to_string(), serde_json::json!(project_id)));
        }
        if let Some(service) = &filters.service {
            clauses.push("service = $service".to_string());
            binds.push(("service".to_string(), serde_json::json!(service)));
        }
        if let Some(level) = filters.level {
            clauses.push("level = $level".to_string());
            binds.push(("level".to_string(), serde_json::json!(level.as_str())));
        }
        if let Some(from) = filters.from {
            clauses.push("received_at >= $from".to_string());
            binds.push(("from".to_string(), serde_json::json!(from)));
        }
        if let Some(to) = filters.to {
            clauses.push("received_at <= $to".to_string());
            binds.push(("to".to_string(), serde_json::json!(to)));
        }
        if let Some(search) = &filters.search {
            clauses.push("string::contains(message, $search)".to_string());
            binds.push(("search".to_string(), serde_json::json!(search)));
        }
        for (i, (key, value)) in filters.metadata_equals.iter().enumerate() {
            let param = format!("meta_{i}");
            let key_param = format!("meta_{i}_key");
            // Bracket indexing keeps the key itself bound rather than spliced
            // into the query text, same as every other filter value here.
            clauses.push(format!("metadata[${key_param}] = ${param}"));
            binds.push((key_param, serde_json::json!(key)));
            binds.push((param, value.clone()));
        }

        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), binds)
        }
    }

    /// Atomically persists a whole batch inside a single transaction, using
    /// one multi-row `INSERT` bound through `$rows` -- no user-supplied
    /// value is ever concatenated into the query text. Identifiers are
    /// reserved from the store's monotonic counter before the statement
    /// runs and assigned in submission order.
    pub async fn insert_batch(
        db: &SurrealDbClient,
        project_id: &str,
        entries: Vec<NewLogEntry>,
    ) -> Result<Vec<Self>, AppError> {
        if entries.is_empty() {
            return Err(AppError::BatchEmpty);
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(AppError::BatchTooLarge {
                max: MAX_BATCH_SIZE,
                actual: entries.len(),
            });
        }

        let received_at = Utc::now();
        let base_seq = db.reserve_sequence(entries.len() as i64).await?;

        let rows: Vec<Self> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                #[allow(clippy::arithmetic_side_effects)]
                let seq = base_seq + i as i64;
                entry.into_stored(project_id, seq, received_at)
            })
            .collect();

        let mut response = db
            .client
            .query(
                "BEGIN TRANSACTION; \
                 INSERT INTO log_entry $rows; \
                 COMMIT TRANSACTION;",
            )
            .bind(("rows", rows.clone()))
            .await?;
        response.take::<Vec<Self>>(0)?;

        Ok(rows)
    }

    pub async fn query(
        db: &SurrealDbClient,
        filters: &LogQueryFilters,
        page: Page,
    ) -> Result<Vec<Self>, AppError> {
        let (clause, binds) = Self::filter_clause(filters);
        let query_str = format!(
            "SELECT * FROM log_entry {clause} ORDER BY received_at DESC, seq DESC LIMIT $limit START $offset"
        );
        let mut query = db.client.query(query_str);
        for (key, value) in binds {
            query = query.bind((key, value));
        }
        query = query.bind(("limit", page.limit)).bind(("offset", page.offset));

        let mut response = query.await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_seq(db: &SurrealDbClient, seq: i64) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM log_entry WHERE seq = $seq LIMIT 1")
            .bind(("seq", seq))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn stats(
        db: &SurrealDbClient,
        project_id: Option<&str>,
    ) -> Result<EntryStats, AppError> {
        let (where_clause, bind_project) = match project_id {
            Some(id) => ("WHERE project_id = $project_id".to_string(), Some(id.to_string())),
            None => (String::new(), None),
        };

        let total_query = format!("SELECT count() AS count FROM log_entry {where_clause} GROUP ALL;");
        let by_level_query = format!(
            "SELECT level AS key, count() AS count FROM log_entry {where_clause} GROUP BY level;"
        );
        let by_service_query = format!(
            "SELECT service AS key, count() AS count FROM log_entry {where_clause} GROUP BY service;"
        );

        let mut q = db.client.query(total_query).query(by_level_query).query(by_service_query);
        if let Some(id) = &bind_project {
            q = q.bind(("project_id", id.clone()));
        }
        let mut response = q.await?;

        let total: Vec<TotalRow> = response.take(0)?;
        let by_level: Vec<GroupCountRow> = response.take(1)?;
        let by_service: Vec<GroupCountRow> = response.take(2)?;

        Ok(EntryStats {
            total: total.first().map_or(0, |r| r.count),
            by_level: by_level.into_iter().map(|r| (r.key, r.count)).collect(),
            by_service: by_service.into_iter().map(|r| (r.key, r.count)).collect(),
        })
    }

    pub async fn count_entries_older_than(
        db: &SurrealDbClient,
        before: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let mut response = db
            .client
            .query("SELECT count() AS count FROM log_entry WHERE received_at < $before GROUP ALL;")
            .bind(("before", before))
            .await?;
        let rows: Vec<TotalRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count))
    }

    pub async fn get_entries_for_archival(
        db: &SurrealDbClient,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM log_entry WHERE received_at < $before \
                 ORDER BY received_at ASC LIMIT $limit;",
            )
            .bind(("before", before))
            .bind(("limit", limit.min(MAX_QUERY_LIMIT)))
            .await?;
        Ok(response.take(0)?)
    }

    /// Deletes entries older than `before`; returns the count removed.
    pub async fn delete_older_than(
        db: &SurrealDbClient,
        before: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count = Self::count_entries_older_than(db, before).await?;
        db.client
            .query("DELETE log_entry WHERE received_at < $before;")
            .bind(("before", before))
            .await?;
        Ok(count)
    }

    /// Count of entries at exactly `level` for `service` received since
    /// `since`. Backs the alert engine's sliding-window rate evaluation --
    /// a leaf-level entry-store operation, not a query-engine concern, so
    /// the alert loop depends only on this crate.
    pub async fn count_since(
        db: &SurrealDbClient,
        service: &str,
        level: LogLevel,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT count() AS count FROM log_entry \
                 WHERE service = $service AND level = $level AND received_at >= $since \
                 GROUP ALL;",
            )
            .bind(("service", service.to_string()))
            .bind(("level", level.as_str()))
            .bind(("since", since))
            .await?;
        let rows: Vec<TotalRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count))
    }
}
