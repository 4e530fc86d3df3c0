use std::sync::Arc;

use common::{
    storage::{
        db::SurrealDbClient,
        types::{alert_config::AlertConfig, alert_violation::AlertViolation},
    },
    utils::config::AppConfig,
};
use lettre::{transport::smtp::authentication::Credentials, Message, SmtpTransport, Transport};
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{error, info, warn};

const DISPATCH_BATCH_LIMIT: u32 = 100;
const RETRY_ATTEMPTS: usize = 3;

/// Sends a violation notification by whichever channel its config carries;
/// a config with neither `notification_email` nor `webhook_url` set has
/// nothing to dispatch and is treated as a no-op success so the violation
/// is still marked sent -- silently dropping an unsendable notification is
/// the only option that doesn't loop forever retrying the unsendable.
pub trait Dispatcher: Send + Sync {
    fn send(&self, config: &AlertConfig, violation: &AlertViolation) -> Result<(), anyhow::Error>;
}

pub struct EmailDispatcher {
    transport: Option<SmtpTransport>,
    from_address: String,
}

impl EmailDispatcher {
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = match (&config.smtp_relay, &config.smtp_username, &config.smtp_password) {
            (Some(relay), Some(username), Some(password)) => {
                let creds = Credentials::new(username.clone(), password.clone());
                SmtpTransport::relay(relay).ok().map(|builder| builder.credentials(creds).build())
            }
            _ => None,
        };
        Self {
            transport,
            from_address: config.alert_from_address.clone().unwrap_or_else(|| "alerts@logforge.local".to_string()),
        }
    }

    fn send_email(&self, to: &str, violation: &AlertViolation) -> Result<(), anyhow::Error> {
        let transport = self.transport.as_ref().ok_or_else(|| anyhow::anyhow!("smtp transport not configured"))?;
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(format!("[logforge] {} breach on {}", violation.level, violation.service))
            .body(format!(
                "service {} observed {} {} events, threshold {}",
                violation.service, violation.observed_count, violation.level, violation.threshold_value
            ))?;
        transport.send(&email)?;
        Ok(())
    }
}

impl Dispatcher for EmailDispatcher {
    fn send(&self, config: &AlertConfig, violation: &AlertViolation) -> Result<(), anyhow::Error> {
        match &config.notification_email {
            Some(to) => self.send_email(to, violation),
            None => Ok(()),
        }
    }
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn send_webhook(&self, url: &str, violation: &AlertViolation) -> Result<(), anyhow::Error> {
        let body = serde_json::json!({
            "id": violation.id,
            "service": violation.service,
            "level": violation.level,
            "observed_count": violation.observed_count,
            "threshold_value": violation.threshold_value,
            "triggered_at": violation.triggered_at,
        });
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook endpoint returned {}", response.status());
        }
        Ok(())
    }
}

/// Dispatches every violation currently awaiting notification, retrying
/// each one with exponential backoff before giving up for this tick. On
/// dispatch failure the violation is left unsent so the next tick retries
/// it too -- the retry here is an intra-tick smoothing of transient
/// failures, not a substitute for that next-tick retry.
pub async fn dispatch_pending(
    db: &Arc<SurrealDbClient>,
    email: &EmailDispatcher,
    webhook: &WebhookDispatcher,
) -> Result<usize, common::error::AppError> {
    let pending = AlertViolation::unsent(db, DISPATCH_BATCH_LIMIT).await?;
    let mut sent = 0usize;

    for violation in pending {
        let Some(config) = AlertConfig::get_by_service(db, &violation.service).await? else {
            warn!(service = %violation.service, "violation references a deleted alert config, skipping");
            continue;
        };

        let email_result = Retry::spawn(ExponentialBackoff::from_millis(50).take(RETRY_ATTEMPTS), || async {
            email.send(&config, &violation)
        })
        .await;

        let webhook_result = match &config.webhook_url {
            Some(url) => {
                Retry::spawn(ExponentialBackoff::from_millis(50).take(RETRY_ATTEMPTS), || {
                    webhook.send_webhook(url, &violation)
                })
                .await
            }
            None => Ok(()),
        };

        match (email_result, webhook_result) {
            (Ok(()), Ok(())) => {
                AlertViolation::mark_sent(db, &violation.id).await?;
                sent += 1;
                info!(violation_id = %violation.id, service = %violation.service, "alert violation dispatched");
            }
            (email_err, webhook_err) => {
                if let Err(e) = email_err {
                    error!(violation_id = %violation.id, error = %e, "email dispatch failed");
                }
                if let Err(e) = webhook_err {
                    error!(violation_id = %violation.id, error = %e, "webhook dispatch failed");
                }
            }
        }
    }

    Ok(sent)
}
