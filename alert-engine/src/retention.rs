use std::sync::Arc;

use chrono::{Duration, Utc};
use common::storage::{db::SurrealDbClient, types::log_entry::LogEntry};
use tracing::info;

/// Deletes every entry older than the configured retention age, run as a
/// periodic sweep alongside alert evaluation rather than a manual
/// operation.
pub async fn sweep(db: &Arc<SurrealDbClient>, retention_age_days: i64) -> Result<i64, common::error::AppError> {
    let cutoff = Utc::now() - Duration::days(retention_age_days);
    let removed = LogEntry::delete_older_than(db, cutoff).await?;
    if removed > 0 {
        info!(removed, cutoff = %cutoff, "retention sweep removed expired entries");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::log_entry::NewLogEntry;
    use uuid::Uuid;

    async fn test_db() -> Arc<SurrealDbClient> {
        let db = SurrealDbClient::memory("retention_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        Arc::new(db)
    }

    #[tokio::test]
    async fn sweep_removes_entries_older_than_retention_window() {
        let db = test_db().await;
        LogEntry::insert_batch(
            &db,
            "proj-a",
            vec![NewLogEntry {
                level: common::storage::types::log_level::LogLevel::Info,
                message: "old".to_string(),
                service: "api".to_string(),
                timestamp: None,
                metadata: None,
                tags: None,
                correlation_id: None,
            }],
        )
        .await
        .expect("insert ok");

        let removed = sweep(&db, -1).await.expect("sweep ok");
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn sweep_leaves_recent_entries_untouched() {
        let db = test_db().await;
        LogEntry::insert_batch(
            &db,
            "proj-a",
            vec![NewLogEntry {
                level: common::storage::types::log_level::LogLevel::Info,
                message: "fresh".to_string(),
                service: "api".to_string(),
                timestamp: None,
                metadata: None,
                tags: None,
                correlation_id: None,
            }],
        )
        .await
        .expect("insert ok");

        let removed = sweep(&db, 30).await.expect("sweep ok");
        assert_eq!(removed, 0);
    }
}
