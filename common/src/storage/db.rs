use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

/// Thin wrapper around the SurrealDB client plus the in-process sequence
/// counter `log_entry.seq` is drawn from.
///
/// Write-path tuning: ingestion is high-fanout append-only and operators
/// tolerate losing the last few seconds of entries on a crash (clients
/// retry), so the deployment's Surreal instance is expected to run with
/// relaxed synchronous-commit durability, an enlarged group-commit buffer,
/// and wider checkpoint spreading. Those are server/storage-engine knobs
/// outside what this client configures; this type does not turn them on or
/// off, it only documents the expectation (see DESIGN.md "write-path
/// tuning").
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
    seq_counter: Arc<AtomicI64>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

#[derive(Debug, serde::Deserialize)]
struct MaxSeqRow {
    max: Option<i64>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;
        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        let seq_counter = Arc::new(AtomicI64::new(0));
        let client = SurrealDbClient { client: db, seq_counter };
        client.seed_sequence_counter().await?;
        Ok(client)
    }

    async fn seed_sequence_counter(&self) -> Result<(), Error> {
        let mut response = self
            .client
            .query("SELECT math::max(seq) AS max FROM log_entry GROUP ALL;")
            .await?;
        let rows: Vec<MaxSeqRow> = response.take(0)?;
        let seeded = rows.first().and_then(|r| r.max).unwrap_or(0);
        self.seq_counter.store(seeded, Ordering::SeqCst);
        Ok(())
    }

    /// Reserves a contiguous block of `count` monotonic identifiers for
    /// `log_entry.seq`, returning the first value in the block. Identifiers
    /// are unique and increasing within this process; gaps are acceptable
    /// (a failed insert simply abandons its reservation) and no cross-process
    /// coordination across replicas is attempted (see DESIGN.md).
    pub async fn reserve_sequence(&self, count: i64) -> Result<i64, AppError> {
        if count <= 0 {
            return Ok(self.seq_counter.load(Ordering::SeqCst));
        }
        #[allow(clippy::arithmetic_side_effects)]
        let base = self.seq_counter.fetch_add(count, Ordering::SeqCst) + 1;
        Ok(base)
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        self.apply_migrations().await?;
        super::indexes::ensure_runtime_indexes(self).await?;
        Ok(())
    }

    /// Reports whether the connection is still serving queries; backs the
    /// `/ready` probe and the alert loop's pool-health check.
    pub async fn ping(&self) -> Result<(), surrealdb::Error> {
        self.client.query("RETURN true;").await?.check()?;
        Ok(())
    }

    /// Defines the relations this system writes to. Idempotent: safe to
    /// call on every process start.
    pub async fn apply_migrations(&self) -> Result<(), Error> {
        self.client
            .query(
                "DEFINE TABLE IF NOT EXISTS project SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS log_entry SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS alert_config SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS alert_violation SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS job_execution SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS insight_record SCHEMALESS;",
            )
            .await?
            .check()?;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient {
            client: db,
            seq_counter: Arc::new(AtomicI64::new(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized().await.expect("Failed to initialize schema");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db.get_item::<Dummy>(&dummy.id).await.expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db.get_all_stored_items::<Dummy>().await.expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db.delete_item::<Dummy>(&dummy.id).await.expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db.get_item::<Dummy>("abc").await.expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn reserve_sequence_hands_out_contiguous_non_overlapping_blocks() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("in-memory db");
        db.ensure_initialized().await.expect("init schema");

        let first = db.reserve_sequence(3).await.expect("reserve ok");
        let second = db.reserve_sequence(2).await.expect("reserve ok");

        assert_eq!(first, 1);
        assert_eq!(second, 4);
    }
}
