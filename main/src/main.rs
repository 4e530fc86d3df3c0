use std::sync::Arc;

use alert_engine::{run_alert_loop, run_retention_loop};
use axum::Router;
use common::utils::config::get_config;
use ingestion_api::{api_routes_v1, api_state::ApiState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined process entrypoint: ingestion API plus the alert/retention
/// worker loops in one binary, for deployments that don't split `server`
/// and `worker` across processes. Unlike the thread-plus-`LocalSet` split
/// this pattern is grounded on, every task here is `Send` (no embedding
/// provider or reranker owns `!Send` state), so both run as plain
/// `tokio::spawn` tasks on the shared runtime rather than a second OS
/// thread with its own runtime.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let api_state = ApiState::new(&config).await?;
    let db = api_state.db.clone();

    let app: Router = api_routes_v1::<ApiState>(&api_state).with_state(api_state);

    info!("starting ingestion api listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await;
        if let Err(err) = result {
            error!(error = %err, "ingestion api server exited with an error");
        }
    });

    info!("starting alert and retention worker");
    let alert_handle = tokio::spawn(run_alert_loop(db.clone(), config.clone(), shutdown.clone()));
    let retention_handle = tokio::spawn(run_retention_loop(db.clone(), config.clone(), shutdown.clone()));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, stopping server and worker loops");
    shutdown.cancel();

    server_handle.await.ok();
    alert_handle.await.ok();
    retention_handle.await.ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::utils::config::AppConfig;
    use ingestion_api::{api_routes_v1, api_state::ApiState};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            max_connections: 10,
            max_idle: 5,
            max_lifetime_secs: 1800,
            retention_age_days: 30,
            retention_sweep_period_secs: 3600,
            alert_evaluation_period_secs: 60,
            announce_buffer_depth: 16,
            rate_limit_per_minute: 1000,
            http_port: 0,
            openai_api_key: "test-key".into(),
            openai_base_url: "https://example.com".into(),
            smtp_relay: None,
            smtp_username: None,
            smtp_password: None,
            alert_from_address: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_serves_liveness_and_readiness() {
        let namespace = "logforge_smoke";
        let database = format!("smoke_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let api_state = ApiState::new(&config).await.expect("api state should build on in-memory storage");
        let app = api_routes_v1::<ApiState>(&api_state).with_state(api_state);

        let live_response = app
            .clone()
            .oneshot(Request::builder().uri("/live").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(live_response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(ready_response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ingest_without_credential_is_rejected_but_reaches_the_pipeline() {
        let namespace = "logforge_smoke_auth";
        let database = format!("smoke_auth_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let api_state = ApiState::new(&config).await.expect("api state should build on in-memory storage");
        let app = api_routes_v1::<ApiState>(&api_state).with_state(api_state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/logs/batch")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn querying_logs_without_a_credential_is_rejected() {
        let namespace = "logforge_smoke_query_auth";
        let database = format!("smoke_query_auth_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let api_state = ApiState::new(&config).await.expect("api state should build on in-memory storage");
        let app = api_routes_v1::<ApiState>(&api_state).with_state(api_state);

        let response = app
            .oneshot(Request::builder().uri("/api/logs").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
