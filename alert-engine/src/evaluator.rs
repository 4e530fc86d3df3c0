use std::sync::Arc;

use chrono::{Duration, Utc};
use common::storage::{
    db::SurrealDbClient,
    types::{
        alert_config::AlertConfig,
        alert_violation::AlertViolation,
        log_entry::LogEntry,
        log_level::LogLevel,
    },
};
use tracing::{info, warn};

/// The sliding window rates are evaluated over: 60 seconds, matched
/// one-to-one against the `_per_min` thresholds stored on `AlertConfig`.
const EVALUATION_WINDOW: Duration = Duration::seconds(60);

/// Evaluates every enabled config once: counts the error and warn rate over
/// the last 60 seconds and opens a violation for whichever threshold is
/// breached, coalescing against any already-unsent violation for that
/// `(config, level)` pair so a sustained breach produces one outstanding
/// notification, not one per tick.
pub async fn evaluate_tick(db: &Arc<SurrealDbClient>) -> Result<usize, common::error::AppError> {
    let configs = AlertConfig::list_enabled(db).await?;
    let since = Utc::now() - EVALUATION_WINDOW;
    let mut opened = 0usize;

    for config in &configs {
        opened += evaluate_level(db, config, LogLevel::Error, config.error_threshold_per_min, since).await?;
        opened += evaluate_level(db, config, LogLevel::Warn, config.warning_threshold_per_min, since).await?;
    }

    Ok(opened)
}

async fn evaluate_level(
    db: &Arc<SurrealDbClient>,
    config: &AlertConfig,
    level: LogLevel,
    threshold: u32,
    since: chrono::DateTime<Utc>,
) -> Result<usize, common::error::AppError> {
    let observed = LogEntry::count_since(db, &config.service, level, since).await?;
    if observed <= threshold as i64 {
        return Ok(0);
    }

    if AlertViolation::latest_unsent(db, &config.id, level).await?.is_some() {
        return Ok(0);
    }

    AlertViolation::create(db, &config.id, &config.service, level, observed as u32, threshold).await?;
    warn!(service = %config.service, %level, observed, threshold, "alert threshold breached");
    Ok(1)
}

/// Runs one evaluation tick, logging the outcome regardless of result so a
/// failed tick is visible without crashing the loop that calls this.
pub async fn run_tick(db: &Arc<SurrealDbClient>) -> Result<usize, common::error::AppError> {
    let opened = evaluate_tick(db).await?;
    if opened > 0 {
        info!(opened, "alert evaluation tick opened new violations");
    }
    Ok(opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::{alert_config::AlertConfigDraft, log_entry::NewLogEntry};
    use uuid::Uuid;

    async fn test_db() -> Arc<SurrealDbClient> {
        let db = SurrealDbClient::memory("evaluator_tests", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        Arc::new(db)
    }

    fn entry(service: &str, level: LogLevel) -> NewLogEntry {
        NewLogEntry {
            level,
            message: "boom".to_string(),
            service: service.to_string(),
            timestamp: None,
            metadata: None,
            tags: None,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn evaluate_tick_opens_violation_when_error_rate_exceeds_threshold() {
        let db = test_db().await;
        AlertConfig::create(
            &db,
            AlertConfigDraft {
                service: "api".to_string(),
                warning_threshold_per_min: 2,
                error_threshold_per_min: 3,
                notification_email: None,
                webhook_url: None,
            },
        )
        .await
        .expect("create config ok");

        LogEntry::insert_batch(
            &db,
            "proj-a",
            vec![
                entry("api", LogLevel::Error),
                entry("api", LogLevel::Error),
                entry("api", LogLevel::Error),
                entry("api", LogLevel::Error),
            ],
        )
        .await
        .expect("insert ok");

        let opened = evaluate_tick(&db).await.expect("evaluate ok");
        assert_eq!(opened, 1);

        let unsent = AlertViolation::unsent(&db, 10).await.expect("unsent ok");
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].observed_count, 4);
    }

    #[tokio::test]
    async fn evaluate_tick_coalesces_repeated_breaches_into_one_violation() {
        let db = test_db().await;
        AlertConfig::create(
            &db,
            AlertConfigDraft {
                service: "api".to_string(),
                warning_threshold_per_min: 1,
                error_threshold_per_min: 1,
                notification_email: None,
                webhook_url: None,
            },
        )
        .await
        .expect("create config ok");

        LogEntry::insert_batch(&db, "proj-a", vec![entry("api", LogLevel::Error), entry("api", LogLevel::Error)])
            .await
            .expect("insert ok");

        let first = evaluate_tick(&db).await.expect("first tick ok");
        assert_eq!(first, 1);

        let second = evaluate_tick(&db).await.expect("second tick ok");
        assert_eq!(second, 0, "an unsent violation already covers this breach");

        let unsent = AlertViolation::unsent(&db, 10).await.expect("unsent ok");
        assert_eq!(unsent.len(), 1);
    }

    #[tokio::test]
    async fn evaluate_tick_ignores_disabled_and_under_threshold_services() {
        let db = test_db().await;
        AlertConfig::create(
            &db,
            AlertConfigDraft {
                service: "quiet".to_string(),
                warning_threshold_per_min: 100,
                error_threshold_per_min: 200,
                notification_email: None,
                webhook_url: None,
            },
        )
        .await
        .expect("create config ok");

        LogEntry::insert_batch(&db, "proj-a", vec![entry("quiet", LogLevel::Error)]).await.expect("insert ok");

        let opened = evaluate_tick(&db).await.expect("evaluate ok");
        assert_eq!(opened, 0);
    }
}
