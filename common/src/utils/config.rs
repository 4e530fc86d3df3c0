use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-wide configuration, sourced from an optional `config.toml` in the
/// working directory overlaid with environment variables (env wins).
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Connection string to the store (SurrealDB endpoint, e.g. `ws://127.0.0.1:8000`).
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_retention_age_days")]
    pub retention_age_days: i64,
    #[serde(default = "default_retention_sweep_period_secs")]
    pub retention_sweep_period_secs: u64,

    #[serde(default = "default_alert_evaluation_period_secs")]
    pub alert_evaluation_period_secs: u64,

    #[serde(default = "default_announce_buffer_depth")]
    pub announce_buffer_depth: usize,

    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default)]
    pub smtp_relay: Option<String>,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub alert_from_address: Option<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_idle() -> u32 {
    5
}

fn default_max_lifetime_secs() -> u64 {
    1800
}

fn default_retention_age_days() -> i64 {
    30
}

fn default_retention_sweep_period_secs() -> u64 {
    3600
}

fn default_alert_evaluation_period_secs() -> u64 {
    60
}

fn default_announce_buffer_depth() -> usize {
    1024
}

fn default_rate_limit_per_minute() -> u32 {
    1000
}

fn default_http_port() -> u16 {
    8080
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            surrealdb_address: "memory".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            max_connections: default_max_connections(),
            max_idle: default_max_idle(),
            max_lifetime_secs: default_max_lifetime_secs(),
            retention_age_days: default_retention_age_days(),
            retention_sweep_period_secs: default_retention_sweep_period_secs(),
            alert_evaluation_period_secs: default_alert_evaluation_period_secs(),
            announce_buffer_depth: default_announce_buffer_depth(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            http_port: default_http_port(),
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            smtp_relay: None,
            smtp_username: None,
            smtp_password: None,
            alert_from_address: None,
        }
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = base_config();
        assert_eq!(cfg.retention_age_days, 30);
        assert_eq!(cfg.alert_evaluation_period_secs, 60);
        assert_eq!(cfg.rate_limit_per_minute, 1000);
    }
}
