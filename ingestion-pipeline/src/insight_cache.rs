use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{insight_record::InsightRecord, log_entry::LogEntry},
    },
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Negative entries are suppressed for this long before a retry is allowed
/// through, so a flapping provider doesn't get hammered by every viewer of
/// the same entry.
const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(60);

/// A generated root-cause explanation for one entry, prior to being stamped
/// into an `InsightRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightDraft {
    pub analysis: String,
    pub root_cause: String,
    pub suggestions: Vec<String>,
    pub model: String,
}

/// The AI insight backend is an interchangeable collaborator: the cache and
/// single-flight logic around it are what this crate is actually responsible
/// for, not the model call itself.
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn analyze(&self, entry: &LogEntry) -> Result<InsightDraft, AppError>;
}

enum Slot {
    InFlight(Arc<Notify>),
    Negative(Instant),
}

/// Single-flight cache over `InsightProvider::analyze`, keyed by
/// `LogEntry.seq`. Concurrent requests for the same entry join the one
/// in-flight call instead of issuing duplicate model calls; a prior failure
/// is remembered for `NEGATIVE_CACHE_TTL` so repeated requests for an entry
/// whose generation keeps failing don't retry on every viewer.
pub struct InsightCache<P: InsightProvider> {
    provider: P,
    inflight: Mutex<HashMap<i64, Slot>>,
}

impl<P: InsightProvider> InsightCache<P> {
    pub fn new(provider: P) -> Self {
        Self { provider, inflight: Mutex::new(HashMap::new()) }
    }

    /// Returns a fresh draft for `entry`, persisted records aside -- callers
    /// check `InsightRecord::get_by_entry_seq` first and only reach here on a
    /// cache miss. Joins an in-flight call for the same `seq` if one exists.
    pub async fn get_or_generate(&self, entry: &LogEntry) -> Result<InsightDraft, AppError> {
        loop {
            let notify = {
                let mut guard = self.inflight.lock().await;
                match guard.get(&entry.seq) {
                    Some(Slot::InFlight(notify)) => Some(notify.clone()),
                    Some(Slot::Negative(at)) if at.elapsed() < NEGATIVE_CACHE_TTL => {
                        return Err(AppError::InternalError(
                            "insight generation recently failed for this entry".to_string(),
                        ));
                    }
                    _ => {
                        guard.insert(entry.seq, Slot::InFlight(Arc::new(Notify::new())));
                        None
                    }
                }
            };

            if let Some(notify) = notify {
                debug!(seq = entry.seq, "joining in-flight insight generation");
                notify.notified().await;
                continue;
            }

            let result = self.provider.analyze(entry).await;

            let mut guard = self.inflight.lock().await;
            if let Some(Slot::InFlight(notify)) = guard.remove(&entry.seq) {
                notify.notify_waiters();
            }
            if result.is_err() {
                guard.insert(entry.seq, Slot::Negative(Instant::now()));
            }
            return result;
        }
    }

    /// Full C7 contract: a persisted `InsightRecord` always wins over the
    /// cache, since it is the durable record of a completed build; only a
    /// cache miss reaches the single-flight generator, whose result is then
    /// upserted before being handed back.
    pub async fn get_or_build(
        &self,
        db: &SurrealDbClient,
        entry: &LogEntry,
    ) -> Result<InsightRecord, AppError> {
        if let Some(existing) = InsightRecord::get_by_entry_seq(db, entry.seq).await? {
            return Ok(existing);
        }

        let draft = self.get_or_generate(entry).await?;
        InsightRecord::upsert(
            db,
            entry.seq,
            draft.analysis,
            draft.root_cause,
            draft.suggestions,
            draft.model,
        )
        .await
    }
}

pub struct OpenAiInsightProvider {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
}

impl OpenAiInsightProvider {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        Self { client: async_openai::Client::with_config(config), model: "gpt-4o-mini".to_string() }
    }
}

fn insight_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "analysis": { "type": "string" },
            "root_cause": { "type": "string" },
            "suggestions": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["analysis", "root_cause", "suggestions"],
        "additionalProperties": false
    })
}

const INSIGHT_SYSTEM_MESSAGE: &str =
    "You are an on-call assistant. Given a single log entry, explain what likely went wrong \
     and suggest concrete next steps. Respond only with the requested JSON object.";

#[async_trait]
impl InsightProvider for OpenAiInsightProvider {
    async fn analyze(&self, entry: &LogEntry) -> Result<InsightDraft, AppError> {
        let user_message = format!(
            "service: {}\nlevel: {}\ntimestamp: {}\nmessage: {}\nmetadata: {}",
            entry.service,
            entry.level,
            entry.timestamp,
            entry.message,
            entry.metadata.clone().unwrap_or(serde_json::Value::Null),
        );

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Root-cause analysis of a single log entry".into()),
                name: "log_insight".into(),
                schema: Some(insight_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.2)
            .max_tokens(1024u32)
            .messages([
                ChatCompletionRequestSystemMessage::from(INSIGHT_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(|err| AppError::InternalError(err.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|err| AppError::InternalError(err.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::InternalError("no content in insight response".to_string()))?;

        #[derive(Deserialize)]
        struct Parsed {
            analysis: String,
            root_cause: String,
            suggestions: Vec<String>,
        }
        let parsed: Parsed = serde_json::from_str(content)
            .map_err(|err| AppError::InternalError(format!("malformed insight response: {err}")))?;

        Ok(InsightDraft {
            analysis: parsed.analysis,
            root_cause: parsed.root_cause,
            suggestions: parsed.suggestions,
            model: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn test_entry(seq: i64) -> LogEntry {
        LogEntry {
            id: "id".to_string(),
            seq,
            project_id: "proj".to_string(),
            received_at: chrono::Utc::now(),
            timestamp: chrono::Utc::now(),
            level: common::storage::types::log_level::LogLevel::Error,
            message: "boom".to_string(),
            service: "api".to_string(),
            correlation_id: None,
            metadata: None,
            tags: None,
            issue_type: None,
            severity_score: None,
            insight_built: false,
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
        barrier: Option<Arc<Barrier>>,
    }

    #[async_trait]
    impl InsightProvider for CountingProvider {
        async fn analyze(&self, _entry: &LogEntry) -> Result<InsightDraft, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if self.fail {
                return Err(AppError::InternalError("boom".to_string()));
            }
            Ok(InsightDraft {
                analysis: "a".to_string(),
                root_cause: "b".to_string(),
                suggestions: vec![],
                model: "test".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_requests_for_same_entry_single_flight() {
        let barrier = Arc::new(Barrier::new(2));
        let provider =
            CountingProvider { calls: AtomicUsize::new(0), fail: false, barrier: Some(barrier.clone()) };
        let cache = Arc::new(InsightCache::new(provider));
        let entry = test_entry(7);

        let c1 = cache.clone();
        let e1 = entry.clone();
        let c2 = cache.clone();
        let e2 = entry.clone();

        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { c1.get_or_generate(&e1).await }),
            tokio::spawn(async move { c2.get_or_generate(&e2).await }),
        );

        r1.unwrap().unwrap();
        r2.unwrap().unwrap();
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_generation_is_negatively_cached() {
        let provider = CountingProvider { calls: AtomicUsize::new(0), fail: true, barrier: None };
        let cache = InsightCache::new(provider);
        let entry = test_entry(9);

        assert!(cache.get_or_generate(&entry).await.is_err());
        assert!(cache.get_or_generate(&entry).await.is_err());
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("insight_cache_tests", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    #[tokio::test]
    async fn get_or_build_persists_and_then_short_circuits_on_the_record() {
        let db = test_db().await;
        let provider = CountingProvider { calls: AtomicUsize::new(0), fail: false, barrier: None };
        let cache = InsightCache::new(provider);
        let entry = test_entry(11);

        let first = cache.get_or_build(&db, &entry).await.expect("first build ok");
        assert_eq!(first.analysis, "a");
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);

        let second = cache.get_or_build(&db, &entry).await.expect("second build ok");
        assert_eq!(second.id, first.id, "persisted record short-circuits the provider");
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }
}
