use crate::{error::AppError, storage::db::SurrealDbClient, storage::types::log_level::LogLevel, stored_object};
use chrono::{DateTime, Utc};

stored_object!(AlertViolation, "alert_violation", {
    config_id: String,
    service: String,
    level: LogLevel,
    observed_count: u32,
    threshold_value: u32,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    triggered_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    alert_sent_at: Option<DateTime<Utc>>
});

impl AlertViolation {
    /// Most recent unsent violation for a `(config, level)` pair, used to
    /// coalesce repeated breaches of the same window into a single
    /// outstanding notification.
    pub async fn latest_unsent(
        db: &SurrealDbClient,
        config_id: &str,
        level: LogLevel,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM alert_violation \
                 WHERE config_id = $config_id AND level = $level AND alert_sent_at = NONE \
                 ORDER BY triggered_at DESC LIMIT 1",
            )
            .bind(("config_id", config_id.to_string()))
            .bind(("level", level.as_str()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn create(
        db: &SurrealDbClient,
        config_id: &str,
        service: &str,
        level: LogLevel,
        observed_count: u32,
        threshold_value: u32,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let violation = Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            config_id: config_id.to_string(),
            service: service.to_string(),
            level,
            observed_count,
            threshold_value,
            triggered_at: now,
            alert_sent_at: None,
        };
        db.store_item(violation)
            .await?
            .ok_or_else(|| AppError::InternalError("failed to persist alert violation".to_string()))
    }

    /// Violations awaiting notification dispatch, oldest first, capped at
    /// `limit` (the notifier dispatches in batches of 100).
    pub async fn unsent(db: &SurrealDbClient, limit: u32) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM alert_violation WHERE alert_sent_at = NONE \
                 ORDER BY triggered_at ASC LIMIT $limit",
            )
            .bind(("limit", limit))
            .await?;
        Ok(response.take(0)?)
    }

    /// Marks dispatch success. Never called again afterward -- the row is
    /// immutable once sent.
    pub async fn mark_sent(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        let _: Option<Self> = db
            .client
            .query("UPDATE alert_violation SET alert_sent_at = $now, updated_at = $now WHERE id = $id")
            .bind(("id", surrealdb::sql::Thing::from((Self::table_name(), id))))
            .bind(("now", now))
            .await?
            .take(0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("alert_violation_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn latest_unsent_ignores_already_sent_violations() {
        let db = test_db().await;
        let violation = AlertViolation::create(&db, "cfg-1", "api", LogLevel::Error, 6, 5)
            .await
            .expect("create ok");

        assert!(AlertViolation::latest_unsent(&db, "cfg-1", LogLevel::Error)
            .await
            .expect("lookup ok")
            .is_some());

        AlertViolation::mark_sent(&db, &violation.id).await.expect("mark sent ok");

        assert!(AlertViolation::latest_unsent(&db, "cfg-1", LogLevel::Error)
            .await
            .expect("lookup ok")
            .is_none());
    }

    #[tokio::test]
    async fn unsent_orders_oldest_first_and_respects_limit() {
        let db = test_db().await;
        AlertViolation::create(&db, "cfg-1", "api", LogLevel::Error, 6, 5).await.expect("create ok");
        AlertViolation::create(&db, "cfg-2", "worker", LogLevel::Warn, 8, 7).await.expect("create ok");

        let unsent = AlertViolation::unsent(&db, 1).await.expect("unsent ok");
        assert_eq!(unsent.len(), 1);
    }
}
