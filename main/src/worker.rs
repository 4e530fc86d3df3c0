use std::sync::Arc;

use alert_engine::{run_alert_loop, run_retention_loop};
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

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

    let shutdown = CancellationToken::new();

    info!("starting alert and retention worker");
    let alert_handle = tokio::spawn(run_alert_loop(db.clone(), config.clone(), shutdown.clone()));
    let retention_handle = tokio::spawn(run_retention_loop(db.clone(), config.clone(), shutdown.clone()));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, stopping worker loops");
    shutdown.cancel();

    alert_handle.await.ok();
    retention_handle.await.ok();

    Ok(())
}
