use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two background passes this system runs; kept as a closed enum since
/// both are known ahead of time rather than an open-ended free string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RetentionSweep,
    AlertEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

stored_object!(JobExecution, "job_execution", {
    job_type: JobType,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    completed_at: Option<DateTime<Utc>>,
    status: JobStatus,
    error_message: Option<String>
});

impl JobExecution {
    pub async fn start(db: &SurrealDbClient, job_type: JobType) -> Result<Self, AppError> {
        let now = Utc::now();
        let job = Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            job_type,
            started_at: now,
            completed_at: None,
            status: JobStatus::Running,
            error_message: None,
        };
        db.store_item(job)
            .await?
            .ok_or_else(|| AppError::InternalError("failed to persist job execution".to_string()))
    }

    pub async fn complete(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.status = JobStatus::Success;
        let _: Option<Self> = db
            .client
            .query(
                "UPDATE job_execution SET status = $status, completed_at = $now, updated_at = $now \
                 WHERE id = $id",
            )
            .bind(("id", surrealdb::sql::Thing::from((Self::table_name(), self.id.as_str()))))
            .bind(("status", "success"))
            .bind(("now", now))
            .await?
            .take(0)?;
        Ok(())
    }

    pub async fn fail(&mut self, db: &SurrealDbClient, error_message: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.to_string());
        let _: Option<Self> = db
            .client
            .query(
                "UPDATE job_execution SET status = $status, completed_at = $now, updated_at = $now, \
                 error_message = $msg WHERE id = $id",
            )
            .bind(("id", surrealdb::sql::Thing::from((Self::table_name(), self.id.as_str()))))
            .bind(("status", "failed"))
            .bind(("now", now))
            .bind(("msg", error_message.to_string()))
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
        let db = SurrealDbClient::memory("job_execution_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn complete_marks_status_and_timestamp() {
        let db = test_db().await;
        let mut job = JobExecution::start(&db, JobType::RetentionSweep).await.expect("start ok");
        assert_eq!(job.status, JobStatus::Running);

        job.complete(&db).await.expect("complete ok");
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn fail_records_error_message() {
        let db = test_db().await;
        let mut job = JobExecution::start(&db, JobType::AlertEvaluation).await.expect("start ok");
        job.fail(&db, "webhook timeout").await.expect("fail ok");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("webhook timeout"));
    }
}
