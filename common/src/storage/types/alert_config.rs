use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use chrono::Utc;
use serde::{Deserialize, Serialize};

stored_object!(AlertConfig, "alert_config", {
    service: String,
    warning_threshold_per_min: u32,
    error_threshold_per_min: u32,
    notification_email: Option<String>,
    webhook_url: Option<String>,
    enabled: bool
});

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfigDraft {
    pub service: String,
    pub warning_threshold_per_min: u32,
    pub error_threshold_per_min: u32,
    pub notification_email: Option<String>,
    pub webhook_url: Option<String>,
}

impl AlertConfig {
    /// One config per service; warning threshold must be strictly below the
    /// error threshold.
    pub async fn create(db: &SurrealDbClient, draft: AlertConfigDraft) -> Result<Self, AppError> {
        if draft.warning_threshold_per_min >= draft.error_threshold_per_min {
            return Err(AppError::Validation(
                "warning_threshold_per_min must be less than error_threshold_per_min".to_string(),
            ));
        }

        let existing: Option<Self> = db
            .client
            .query("SELECT * FROM alert_config WHERE service = $service LIMIT 1")
            .bind(("service", draft.service.clone()))
            .await?
            .take(0)?;
        if existing.is_some() {
            return Err(AppError::Validation(format!(
                "alert config for service '{}' already exists",
                draft.service
            )));
        }

        let now = Utc::now();
        let config = Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            service: draft.service,
            warning_threshold_per_min: draft.warning_threshold_per_min,
            error_threshold_per_min: draft.error_threshold_per_min,
            notification_email: draft.notification_email,
            webhook_url: draft.webhook_url,
            enabled: true,
        };

        db.store_item(config)
            .await?
            .ok_or_else(|| AppError::InternalError("failed to persist alert config".to_string()))
    }

    pub async fn list_enabled(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM alert_config WHERE enabled = true")
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_service(
        db: &SurrealDbClient,
        service: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM alert_config WHERE service = $service LIMIT 1")
            .bind(("service", service.to_string()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("alert_config_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    fn draft(service: &str) -> AlertConfigDraft {
        AlertConfigDraft {
            service: service.to_string(),
            warning_threshold_per_min: 5,
            error_threshold_per_min: 10,
            notification_email: None,
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_warning_threshold_above_error_threshold() {
        let db = test_db().await;
        let mut bad = draft("api");
        bad.warning_threshold_per_min = 20;
        let err = AlertConfig::create(&db, bad).await.expect_err("should reject");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_service() {
        let db = test_db().await;
        AlertConfig::create(&db, draft("api")).await.expect("first create ok");
        let err = AlertConfig::create(&db, draft("api")).await.expect_err("should reject dup");
        assert!(matches!(err, AppError::Validation(_)));
    }
}
