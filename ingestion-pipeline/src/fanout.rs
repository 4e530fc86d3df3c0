use std::sync::RwLock;

use common::storage::types::{log_entry::LogEntry, log_level::LogLevel};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Narrows a live subscription to the entries its holder is watching.
/// `None` on any field means "no constraint on this dimension", mirroring
/// `LogQueryFilters`'s conjunctive-match shape.
#[derive(Debug, Clone, Default)]
pub struct FanoutFilter {
    pub project_id: Option<String>,
    pub service: Option<String>,
    pub min_level: Option<LogLevel>,
}

impl FanoutFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(project_id) = &self.project_id {
            if &entry.project_id != project_id {
                return false;
            }
        }
        if let Some(service) = &self.service {
            if &entry.service != service {
                return false;
            }
        }
        if let Some(min_level) = self.min_level {
            if entry.level < min_level {
                return false;
            }
        }
        true
    }
}

struct Subscription {
    id: Uuid,
    filter: FanoutFilter,
    sender: broadcast::Sender<LogEntry>,
}

/// In-process pub/sub fan-out for newly persisted entries. Each
/// subscription owns its own bounded `broadcast` channel; a slow
/// subscriber only drops its own oldest unread entries (the receiver-side
/// lag that `broadcast` already implements) and never blocks ingestion or
/// other subscribers.
pub struct LiveFanout {
    buffer_depth: usize,
    subscriptions: RwLock<Vec<Subscription>>,
}

pub struct Subscriber {
    pub id: Uuid,
    pub receiver: broadcast::Receiver<LogEntry>,
}

impl LiveFanout {
    pub fn new(buffer_depth: usize) -> Self {
        Self { buffer_depth: buffer_depth.max(1), subscriptions: RwLock::new(Vec::new()) }
    }

    pub fn subscribe(&self, filter: FanoutFilter) -> Subscriber {
        let (sender, receiver) = broadcast::channel(self.buffer_depth);
        let id = Uuid::new_v4();
        self.subscriptions
            .write()
            .expect("fanout subscriptions lock poisoned")
            .push(Subscription { id, filter, sender });
        Subscriber { id, receiver }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscriptions
            .write()
            .expect("fanout subscriptions lock poisoned")
            .retain(|sub| sub.id != id);
    }

    /// Best-effort announce: publishing never fails the ingest path. A
    /// subscriber with no active receivers (a `SendError`) is simply a
    /// closed subscription that hasn't been reaped yet.
    pub fn publish(&self, entries: &[LogEntry]) {
        let subscriptions = self.subscriptions.read().expect("fanout subscriptions lock poisoned");
        for entry in entries {
            for sub in subscriptions.iter() {
                if sub.filter.matches(entry) {
                    if let Err(err) = sub.sender.send(entry.clone()) {
                        warn!(subscription = %sub.id, error = %err, "no active receivers for announce");
                    }
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().expect("fanout subscriptions lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::log_level::LogLevel;

    fn entry(project_id: &str, service: &str, level: LogLevel) -> LogEntry {
        LogEntry {
            id: Uuid::new_v4().to_string(),
            seq: 1,
            project_id: project_id.to_string(),
            received_at: chrono::Utc::now(),
            timestamp: chrono::Utc::now(),
            level,
            message: "hi".to_string(),
            service: service.to_string(),
            correlation_id: None,
            metadata: None,
            tags: None,
            issue_type: None,
            severity_score: None,
            insight_built: false,
        }
    }

    #[tokio::test]
    async fn subscriber_only_receives_matching_entries() {
        let fanout = LiveFanout::new(16);
        let mut sub = fanout.subscribe(FanoutFilter {
            project_id: Some("proj-a".to_string()),
            service: None,
            min_level: None,
        });

        fanout.publish(&[entry("proj-a", "api", LogLevel::Info), entry("proj-b", "api", LogLevel::Info)]);

        let received = sub.receiver.recv().await.expect("should receive");
        assert_eq!(received.project_id, "proj-a");
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn min_level_filters_out_lower_severity() {
        let fanout = LiveFanout::new(16);
        let mut sub = fanout.subscribe(FanoutFilter { project_id: None, service: None, min_level: Some(LogLevel::Error) });

        fanout.publish(&[entry("p", "api", LogLevel::Info), entry("p", "api", LogLevel::Error)]);

        let received = sub.receiver.recv().await.expect("should receive");
        assert_eq!(received.level, LogLevel::Error);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_without_blocking_others() {
        let fanout = LiveFanout::new(2);
        let mut lagging = fanout.subscribe(FanoutFilter::default());

        let entries: Vec<LogEntry> = (0..5).map(|_| entry("p", "api", LogLevel::Info)).collect();
        fanout.publish(&entries);

        let err = lagging.receiver.recv().await.expect_err("should have lagged");
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscription() {
        let fanout = LiveFanout::new(4);
        let sub = fanout.subscribe(FanoutFilter::default());
        assert_eq!(fanout.subscriber_count(), 1);
        fanout.unsubscribe(sub.id);
        assert_eq!(fanout.subscriber_count(), 0);
    }
}
