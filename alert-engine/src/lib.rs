#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod evaluator;
pub mod notifier;
pub mod retention;

use std::sync::Arc;

use common::{
    storage::{
        db::SurrealDbClient,
        types::job_execution::{JobExecution, JobType},
    },
    utils::config::AppConfig,
};
use notifier::{EmailDispatcher, WebhookDispatcher};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs the alert evaluation tick and the violation dispatch pass on a
/// fixed period, stopping cleanly once `shutdown` is cancelled. Grounded on
/// `ingestion-pipeline::run_worker_loop`'s claim-or-sleep shape, generalized
/// from "claim a queued job" to "sleep until the next tick, evaluate every
/// enabled config" since alert evaluation is a fixed-period sweep rather
/// than a work queue drain.
pub async fn run_alert_loop(
    db: Arc<SurrealDbClient>,
    config: AppConfig,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs(config.alert_evaluation_period_secs));
    let email = EmailDispatcher::from_config(&config);
    let webhook = WebhookDispatcher::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&db, &email, &webhook).await;
            }
            _ = shutdown.cancelled() => {
                info!("alert loop received shutdown signal, exiting after in-flight tick");
                return;
            }
        }
    }
}

async fn run_tick(db: &Arc<SurrealDbClient>, email: &EmailDispatcher, webhook: &WebhookDispatcher) {
    let mut job = match JobExecution::start(db, JobType::AlertEvaluation).await {
        Ok(job) => job,
        Err(err) => {
            error!(error = %err, "failed to record alert evaluation job start");
            return;
        }
    };

    let outcome = async {
        let opened = evaluator::run_tick(db).await?;
        let sent = notifier::dispatch_pending(db, email, webhook).await?;
        Ok::<_, common::error::AppError>((opened, sent))
    }
    .await;

    match outcome {
        Ok((opened, sent)) => {
            if let Err(err) = job.complete(db).await {
                error!(error = %err, "failed to record alert evaluation job completion");
            }
            info!(opened, sent, "alert evaluation tick finished");
        }
        Err(err) => {
            error!(error = %err, "alert evaluation tick failed");
            if let Err(mark_err) = job.fail(db, &err.to_string()).await {
                error!(error = %mark_err, "failed to record alert evaluation job failure");
            }
        }
    }
}

/// Runs the retention sweep on a fixed period, as a second periodic job
/// alongside alert evaluation rather than leaving `delete_older_than`
/// unscheduled.
pub async fn run_retention_loop(
    db: Arc<SurrealDbClient>,
    config: AppConfig,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs(config.retention_sweep_period_secs));
    let retention_age_days = config.retention_age_days;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_retention_tick(&db, retention_age_days).await;
            }
            _ = shutdown.cancelled() => {
                info!("retention loop received shutdown signal, exiting after in-flight tick");
                return;
            }
        }
    }
}

async fn run_retention_tick(db: &Arc<SurrealDbClient>, retention_age_days: i64) {
    let mut job = match JobExecution::start(db, JobType::RetentionSweep).await {
        Ok(job) => job,
        Err(err) => {
            error!(error = %err, "failed to record retention sweep job start");
            return;
        }
    };

    match retention::sweep(db, retention_age_days).await {
        Ok(removed) => {
            if let Err(err) = job.complete(db).await {
                error!(error = %err, "failed to record retention sweep job completion");
            }
            info!(removed, "retention sweep finished");
        }
        Err(err) => {
            error!(error = %err, "retention sweep failed");
            if let Err(mark_err) = job.fail(db, &err.to_string()).await {
                error!(error = %mark_err, "failed to record retention sweep job failure");
            }
        }
    }
}
