//! Store factory
//!
//! Builds the source, destination and checkpoint stores of a run from
//! configuration. Every PostgreSQL-backed store shares one client, and so
//! one connection pool.

use crate::adapters::database::traits::{CheckpointStorage, DocumentStore};
use crate::adapters::filesystem::FileCheckpointStore;
use crate::adapters::postgresql::{PostgreSQLCheckpointStore, PostgreSQLClient, PostgreSQLCollection};
use crate::config::schema::{PhimaskConfig, StateConfig};
use crate::domain::ids::CollectionName;
use crate::domain::{PhimaskError, Result};
use std::sync::Arc;

/// Stores used by one masking run
#[derive(Clone)]
pub struct RunStores {
    /// Collection documents are read from
    pub source: Arc<dyn DocumentStore>,
    /// Collection masked documents are written to; the same store as
    /// `source` when masking in place
    pub destination: Arc<dyn DocumentStore>,
    /// Checkpoint backend
    pub checkpoints: Arc<dyn CheckpointStorage>,
}

/// Create the stores for a run
///
/// # Errors
///
/// Returns `PhimaskError::Configuration` for invalid collection names or
/// connection settings.
pub async fn create_run_stores(config: &PhimaskConfig) -> Result<RunStores> {
    tracing::info!("Creating PostgreSQL client");
    let client = Arc::new(PostgreSQLClient::new(config.postgresql.clone())?);

    let source_name =
        CollectionName::new(config.source.collection.clone()).map_err(PhimaskError::Configuration)?;
    let source: Arc<dyn DocumentStore> =
        Arc::new(PostgreSQLCollection::new(client.clone(), source_name));

    let destination: Arc<dyn DocumentStore> = match &config.destination.collection {
        Some(name) => {
            let name = CollectionName::new(name.clone()).map_err(PhimaskError::Configuration)?;
            Arc::new(PostgreSQLCollection::new(client.clone(), name))
        }
        None => source.clone(),
    };

    let checkpoints = create_checkpoint_storage(&config.state, Some(client)).await?;

    Ok(RunStores {
        source,
        destination,
        checkpoints,
    })
}

/// Create the checkpoint store selected by `state.backend`
///
/// A PostgreSQL backend reuses `client` when given.
///
/// # Errors
///
/// Returns an error if the PostgreSQL backend is selected without a client.
/// No schema is created here; the PostgreSQL store creates its table on the
/// first save.
pub async fn create_checkpoint_storage(
    state: &StateConfig,
    client: Option<Arc<PostgreSQLClient>>,
) -> Result<Arc<dyn CheckpointStorage>> {
    match state.backend.as_str() {
        "postgresql" => {
            let client = client.ok_or_else(|| {
                PhimaskError::Configuration(
                    "state.backend 'postgresql' requires a PostgreSQL connection".to_string(),
                )
            })?;
            tracing::info!("Using PostgreSQL checkpoint storage");
            Ok(Arc::new(PostgreSQLCheckpointStore::new(client)))
        }
        "file" => {
            tracing::info!(
                dir = %state.checkpoint_dir.display(),
                "Using file checkpoint storage"
            );
            Ok(Arc::new(FileCheckpointStore::new(state.checkpoint_dir.clone())))
        }
        other => Err(PhimaskError::Configuration(format!(
            "Invalid state.backend '{other}'. Must be one of: file, postgresql"
        ))),
    }
}
