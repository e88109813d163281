//! PostgreSQL collection and checkpoint store
//!
//! Each collection is a table of `(sort_key, doc)` rows. `sort_key` holds
//! [`DocumentId::sort_key`] under the `"C"` collation, so `ORDER BY sort_key`
//! is the identifier order the pipeline walks in.

use crate::adapters::database::traits::{
    CheckpointStorage, CollectionQuery, DocumentStore, StoredRecord,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::PostgreSQLCheckpoint;
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::document::Document;
use crate::domain::ids::{CheckpointKey, CollectionName, DocumentId};
use crate::domain::{PhimaskError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_postgres::Row;

const SELECTION: &str =
    "($1::jsonb IS NULL OR doc @> $1::jsonb) AND ($2::text IS NULL OR sort_key > $2::text)";

/// One document collection stored as a PostgreSQL table
pub struct PostgreSQLCollection {
    client: Arc<PostgreSQLClient>,
    name: CollectionName,
    table: String,
}

impl PostgreSQLCollection {
    /// Create a collection handle over a shared client
    pub fn new(client: Arc<PostgreSQLClient>, name: CollectionName) -> Self {
        // Collection names are restricted to [A-Za-z0-9_], quoting keeps case
        let table = format!("\"{}\"", name.as_str());
        Self {
            client,
            name,
            table,
        }
    }

    fn record_from_row(&self, row: &Row) -> Result<StoredRecord> {
        let sort_key: String = row.try_get("sort_key")?;
        let raw: Value = row.try_get("doc")?;
        let id = DocumentId::from_sort_key(&sort_key).map_err(|e| {
            PhimaskError::Database(format!("Corrupt sort key in {}: {e}", self.name))
        })?;
        Ok(StoredRecord { id, raw })
    }
}

#[async_trait]
impl DocumentStore for PostgreSQLCollection {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn ensure_collection(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                sort_key TEXT COLLATE \"C\" PRIMARY KEY,
                doc JSONB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS \"{name}_doc_gin\" ON {table} USING GIN (doc jsonb_path_ops);",
            table = self.table,
            name = self.name.as_str(),
        );
        self.client.batch_execute(&sql).await?;

        tracing::debug!(collection = %self.name, "PostgreSQL collection ready");
        Ok(())
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {SELECTION}", self.table);
        let after = query.after.as_ref().map(DocumentId::sort_key);
        let rows = self
            .client
            .query(&sql, &[&query.filter, &after])
            .await?;

        let count: i64 = match rows.first() {
            Some(row) => row.try_get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT sort_key, doc FROM {} WHERE {SELECTION} ORDER BY sort_key LIMIT $3",
            self.table
        );
        let after = query.after.as_ref().map(DocumentId::sort_key);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = self
            .client
            .query(&sql, &[&query.filter, &after, &limit])
            .await?;

        rows.iter().map(|row| self.record_from_row(row)).collect()
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = format!("SELECT sort_key FROM {} WHERE sort_key = ANY($1)", self.table);
        let keys: Vec<String> = ids.iter().map(DocumentId::sort_key).collect();

        let rows = self.client.query(&sql, &[&keys]).await?;

        rows.iter()
            .map(|row| {
                let sort_key: String = row.try_get("sort_key")?;
                DocumentId::from_sort_key(&sort_key).map_err(|e| {
                    PhimaskError::Database(format!("Corrupt sort key in {}: {e}", self.name))
                })
            })
            .collect()
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {} (sort_key, doc) VALUES ($1, $2)
             ON CONFLICT (sort_key) DO UPDATE SET doc = EXCLUDED.doc",
            self.table
        );

        let mut conn = self.client.get_connection().await?;
        let tx = conn.transaction().await?;
        let statement = tx.prepare(&sql).await?;
        for document in documents {
            let sort_key = document.id().sort_key();
            let doc = Value::Object(document.body().clone());
            tx.execute(&statement, &[&sort_key, &doc]).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            collection = %self.name,
            count = documents.len(),
            "Batch upserted to PostgreSQL"
        );
        Ok(documents.len())
    }

    async fn fetch_many(&self, ids: &[DocumentId]) -> Result<Vec<StoredRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT sort_key, doc FROM {} WHERE sort_key = ANY($1) ORDER BY sort_key",
            self.table
        );
        let keys: Vec<String> = ids.iter().map(DocumentId::sort_key).collect();

        let rows = self.client.query(&sql, &[&keys]).await?;
        rows.iter().map(|row| self.record_from_row(row)).collect()
    }
}

/// Checkpoint store backed by the `phimask_checkpoints` table
///
/// The table is created on the first save. Reads against a database that
/// has never stored a checkpoint see an empty store.
pub struct PostgreSQLCheckpointStore {
    client: Arc<PostgreSQLClient>,
    schema: OnceCell<()>,
}

impl PostgreSQLCheckpointStore {
    /// Create the store over a shared client
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self {
            client,
            schema: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| self.client.ensure_checkpoint_schema())
            .await?;
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        if self.schema.initialized() {
            return Ok(true);
        }
        let rows = self
            .client
            .query(
                "SELECT to_regclass('phimask_checkpoints') IS NOT NULL",
                &[],
            )
            .await?;
        match rows.first() {
            Some(row) => Ok(row.try_get(0)?),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CheckpointStorage for PostgreSQLCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        tracing::debug!(key = %key, "Loading checkpoint from PostgreSQL");

        if !self.table_exists().await? {
            tracing::debug!(key = %key, "No checkpoint table in PostgreSQL (first run)");
            return Ok(None);
        }

        let rows = self
            .client
            .query(
                "SELECT * FROM phimask_checkpoints WHERE key = $1",
                &[&key.as_str()],
            )
            .await?;

        match rows.first() {
            Some(row) => {
                let checkpoint = PostgreSQLCheckpoint::from_row(row)?.to_domain()?;
                tracing::debug!(
                    key = %key,
                    documents_processed = checkpoint.documents_processed,
                    status = checkpoint.status.as_str(),
                    "Checkpoint loaded from PostgreSQL"
                );
                Ok(Some(checkpoint))
            }
            None => {
                tracing::debug!(key = %key, "No checkpoint found in PostgreSQL (first run)");
                Ok(None)
            }
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.ensure_schema().await?;
        let row = PostgreSQLCheckpoint::from_domain(checkpoint)?;

        let statement = r#"
            INSERT INTO phimask_checkpoints (
                key, run_id, last_processed_id, documents_processed,
                started_at, updated_at, completed_at, status, source, destination
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (key) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                last_processed_id = EXCLUDED.last_processed_id,
                documents_processed = EXCLUDED.documents_processed,
                started_at = EXCLUDED.started_at,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at,
                status = EXCLUDED.status,
                source = EXCLUDED.source,
                destination = EXCLUDED.destination
        "#;

        self.client
            .execute(
                statement,
                &[
                    &row.key,
                    &row.run_id,
                    &row.last_processed_id,
                    &row.documents_processed,
                    &row.started_at,
                    &row.updated_at,
                    &row.completed_at,
                    &row.status,
                    &row.source,
                    &row.destination,
                ],
            )
            .await?;

        tracing::debug!(
            key = %checkpoint.key,
            documents_processed = checkpoint.documents_processed,
            "Checkpoint saved to PostgreSQL"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query("SELECT * FROM phimask_checkpoints ORDER BY key", &[])
            .await?;

        rows.iter()
            .map(|row| PostgreSQLCheckpoint::from_row(row)?.to_domain())
            .collect()
    }
}
