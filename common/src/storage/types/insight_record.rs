use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use chrono::{DateTime, Utc};

stored_object!(InsightRecord, "insight_record", {
    entry_seq: i64,
    analysis: String,
    root_cause: String,
    suggestions: Vec<String>,
    model: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    generated_at: DateTime<Utc>
});

impl InsightRecord {
    pub async fn get_by_entry_seq(
        db: &SurrealDbClient,
        entry_seq: i64,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM insight_record WHERE entry_seq = $entry_seq LIMIT 1")
            .bind(("entry_seq", entry_seq))
            .await?;
        Ok(response.take(0)?)
    }

    /// Replaces any previous record for the same entry -- unique by
    /// `entry_seq`.
    pub async fn upsert(
        db: &SurrealDbClient,
        entry_seq: i64,
        analysis: String,
        root_cause: String,
        suggestions: Vec<String>,
        model: String,
    ) -> Result<Self, AppError> {
        if let Some(existing) = Self::get_by_entry_seq(db, entry_seq).await? {
            let _: Option<Self> = db.delete_item(&existing.id).await?;
        }

        let now = Utc::now();
        let record = Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entry_seq,
            analysis,
            root_cause,
            suggestions,
            model,
            generated_at: now,
        };
        db.store_item(record)
            .await?
            .ok_or_else(|| AppError::InternalError("failed to persist insight record".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("insight_record_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn upsert_replaces_previous_record_for_same_entry() {
        let db = test_db().await;
        InsightRecord::upsert(&db, 42, "first pass".into(), "timeout".into(), vec!["retry".into()], "gpt".into())
            .await
            .expect("first upsert ok");
        InsightRecord::upsert(&db, 42, "second pass".into(), "timeout".into(), vec!["retry".into(), "scale up".into()], "gpt".into())
            .await
            .expect("second upsert ok");

        let stored = InsightRecord::get_by_entry_seq(&db, 42).await.expect("lookup ok");
        let stored = stored.expect("record should exist");
        assert_eq!(stored.analysis, "second pass");
        assert_eq!(stored.suggestions.len(), 2);
    }
}
