use anyhow::{Context, Result};
use tracing::debug;

use crate::{error::AppError, storage::db::SurrealDbClient};

/// One `DEFINE INDEX` statement for a secondary index this system relies on.
/// SurrealDB's object-field indexing stands in for a GIN-equivalent index
/// on `metadata`.
struct IndexSpec {
    index_name: &'static str,
    table: &'static str,
    fields: &'static str,
    unique: bool,
}

const fn index_specs() -> [IndexSpec; 8] {
    [
        IndexSpec {
            index_name: "idx_log_entry_received_at",
            table: "log_entry",
            fields: "received_at",
            unique: false,
        },
        IndexSpec {
            index_name: "idx_log_entry_service_level_received_at",
            table: "log_entry",
            fields: "service, level, received_at",
            unique: false,
        },
        IndexSpec {
            index_name: "idx_log_entry_project_received_at",
            table: "log_entry",
            fields: "project_id, received_at",
            unique: false,
        },
        IndexSpec {
            index_name: "idx_log_entry_correlation_id",
            table: "log_entry",
            fields: "correlation_id",
            unique: false,
        },
        IndexSpec {
            index_name: "idx_log_entry_metadata",
            table: "log_entry",
            fields: "metadata",
            unique: false,
        },
        IndexSpec {
            index_name: "idx_project_credential",
            table: "project",
            fields: "credential",
            unique: true,
        },
        IndexSpec {
            index_name: "idx_project_owner_slug",
            table: "project",
            fields: "owner_id, slug",
            unique: true,
        },
        IndexSpec {
            index_name: "idx_alert_config_service",
            table: "alert_config",
            fields: "service",
            unique: true,
        },
    ]
}

impl IndexSpec {
    fn definition(&self) -> String {
        let uniqueness = if self.unique { " UNIQUE" } else { "" };
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {fields}{uniqueness};",
            index = self.index_name,
            table = self.table,
            fields = self.fields,
        )
    }
}

/// Defines every secondary index this crate depends on. Idempotent: safe to
/// call on every process start (`SurrealDbClient::ensure_initialized`).
///
/// `alert_violation`'s own `(config_id, level, triggered_at)` /
/// `alert_sent_at IS NULL` lookup is left to a plain `ORDER BY`/`WHERE` scan
/// -- that table is small and append-only relative to `log_entry`, so an
/// explicit index wasn't worth the extra `DEFINE INDEX` here.
pub async fn ensure_runtime_indexes(db: &SurrealDbClient) -> Result<(), AppError> {
    ensure_runtime_indexes_inner(db)
        .await
        .map_err(|err| AppError::InternalError(err.to_string()))
}

async fn ensure_runtime_indexes_inner(db: &SurrealDbClient) -> Result<()> {
    for spec in index_specs() {
        debug!(index = spec.index_name, table = spec.table, "defining index");
        db.client
            .query(spec.definition())
            .await
            .with_context(|| format!("defining index {}", spec.index_name))?
            .check()
            .with_context(|| format!("index definition rejected for {}", spec.index_name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn ensure_runtime_indexes_is_idempotent() {
        let namespace = "indexes_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations should succeed");

        ensure_runtime_indexes(&db).await.expect("first run");
        ensure_runtime_indexes(&db).await.expect("second run is a no-op");
    }
}
