use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use ingestion_pipeline::{
    insight_cache::{InsightCache, OpenAiInsightProvider},
    IngestionPipeline, LiveFanout,
};
use query_engine::QueryEngine;

use crate::middleware_rate_limit::RateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub pipeline: Arc<IngestionPipeline>,
    pub query: Arc<QueryEngine>,
    pub insights: Arc<InsightCache<OpenAiInsightProvider>>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.ensure_initialized().await?;

        let fanout = Arc::new(LiveFanout::new(config.announce_buffer_depth));
        let pipeline = Arc::new(IngestionPipeline::new(db.clone(), fanout));
        let query = Arc::new(QueryEngine::new(db.clone()));
        let insights = Arc::new(InsightCache::new(OpenAiInsightProvider::new(
            &config.openai_api_key,
            &config.openai_base_url,
        )));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));

        Ok(Self { db, config: config.clone(), pipeline, query, insights, rate_limiter })
    }
}
