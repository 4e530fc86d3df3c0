#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod fanout;
pub mod insight_cache;
pub mod pipeline;

pub use fanout::{FanoutFilter, LiveFanout, Subscriber};
pub use insight_cache::{InsightCache, InsightDraft, InsightProvider, OpenAiInsightProvider};
pub use pipeline::{BatchOutcome, CredentialSource, IngestionPipeline};
