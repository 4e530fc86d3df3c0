use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use middleware_rate_limit::rate_limit;
use routes::{
    ingest::ingest_batch,
    liveness::live,
    logs::{export_logs, get_correlated, get_log, list_logs, log_stats},
    readiness::ready,
};
use tower_http::trace::TraceLayer;

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod middleware_rate_limit;
mod routes;

/// A single ingest batch can legitimately carry `MAX_BATCH_SIZE` entries
/// each up to `MAX_MESSAGE_BYTES` of message and `MAX_METADATA_BYTES` of
/// metadata; the wire body limit only needs to be generous enough that a
/// handful of large entries in one batch is not rejected at the transport
/// layer before validation ever sees them.
const INGEST_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Router for API functionality, version 1.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes).
    let public = Router::new().route("/ready", get(ready)).route("/live", get(live));

    // Ingest authenticates itself inside `IngestionPipeline::handle_batch`
    // (routes::ingest doc comment), so it only needs rate limiting here.
    let ingest = Router::new()
        .route(
            "/api/logs/batch",
            post(ingest_batch).layer(DefaultBodyLimit::max(INGEST_MAX_BODY_BYTES)),
        )
        .route_layer(from_fn_with_state(app_state.clone(), rate_limit));

    // Query and export endpoints are scoped to the project resolved by
    // `api_auth` from the caller's credential, never a client-supplied
    // project identifier.
    let query = Router::new()
        .route("/api/logs", get(list_logs))
        .route("/api/logs/stats", get(log_stats))
        .route("/api/logs/export", get(export_logs))
        .route("/api/logs/correlated/{correlation_id}", get(get_correlated))
        .route("/api/logs/{id}", get(get_log))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth))
        .route_layer(from_fn_with_state(app_state.clone(), rate_limit));

    public.merge(ingest).merge(query).layer(TraceLayer::new_for_http())
}
