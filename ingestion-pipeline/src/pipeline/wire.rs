use common::storage::types::{log_entry::NewLogEntry, log_level::LogLevel};
use serde::Deserialize;

/// The wire shape of `POST /api/logs/batch`'s body. Unknown keys -- both at
/// the top level alongside `entries` and inside each entry object -- are
/// ignored for forward-compat, which is `serde`'s default behavior for a
/// struct without `#[serde(deny_unknown_fields)]`.
#[derive(Debug, Deserialize)]
pub struct WireBatch {
    pub entries: Vec<WireLogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WireLogEntry {
    pub level: String,
    pub message: String,
    pub service: String,
    pub timestamp: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub correlation_id: Option<String>,
}

/// One field failed to parse into a well-typed `NewLogEntry`. Carries the
/// field name so the caller can build the `entry_invalid` error's
/// `{index, field}` detail.
pub struct WireFieldError(pub &'static str);

impl WireLogEntry {
    pub fn into_new_log_entry(self) -> Result<NewLogEntry, WireFieldError> {
        let level = LogLevel::parse(&self.level).ok_or(WireFieldError("level"))?;

        let timestamp = match self.timestamp {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(
                chrono::DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|_| WireFieldError("timestamp"))?,
            ),
            None => None,
        };

        Ok(NewLogEntry {
            level,
            message: self.message,
            service: self.service,
            timestamp,
            metadata: self.metadata,
            tags: self.tags,
            correlation_id: self.correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(level: &str) -> WireLogEntry {
        WireLogEntry {
            level: level.to_string(),
            message: "hi".to_string(),
            service: "api".to_string(),
            timestamp: None,
            metadata: None,
            tags: None,
            correlation_id: None,
        }
    }

    #[test]
    fn rejects_unknown_level() {
        let err = wire("panic").into_new_log_entry().expect_err("should reject");
        assert_eq!(err.0, "level");
    }

    #[test]
    fn accepts_warning_alias() {
        let entry = wire("warning").into_new_log_entry().expect("should parse");
        assert_eq!(entry.level, LogLevel::Warn);
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let mut w = wire("info");
        w.timestamp = Some("not-a-date".to_string());
        let err = w.into_new_log_entry().expect_err("should reject");
        assert_eq!(err.0, "timestamp");
    }

    #[test]
    fn accepts_rfc3339_timestamp() {
        let mut w = wire("info");
        w.timestamp = Some("2024-01-01T00:00:00Z".to_string());
        let entry = w.into_new_log_entry().expect("should parse");
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn ignores_unknown_top_level_and_entry_fields() {
        let body = serde_json::json!({
            "entries": [{"level":"info","message":"x","service":"s","session_id":"abc"}],
            "ignored_top_level": true
        });
        let parsed: WireBatch = serde_json::from_value(body).expect("should parse despite extras");
        assert_eq!(parsed.entries.len(), 1);
    }
}
