//! Storage factory
//!
//! This module creates the storage backend selected by configuration.

use crate::adapters::database::traits::{
    ChannelStorage, DatabaseClient, LockStorage, MappingStorage, ProcessingStorage,
};
use crate::adapters::memory::MemoryStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{DatabaseTarget, RelayConfig};
use crate::domain::{RelayError, Result};
use std::sync::Arc;

/// Every storage concern, backed by one shared implementation
#[derive(Clone)]
pub struct Storage {
    pub database: Arc<dyn DatabaseClient + Send + Sync>,
    pub channels: Arc<dyn ChannelStorage + Send + Sync>,
    pub processing: Arc<dyn ProcessingStorage + Send + Sync>,
    pub locks: Arc<dyn LockStorage + Send + Sync>,
    pub mappings: Arc<dyn MappingStorage + Send + Sync>,
}

impl Storage {
    /// Expose one backend through every storage trait
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: DatabaseClient
            + ChannelStorage
            + ProcessingStorage
            + LockStorage
            + MappingStorage
            + Send
            + Sync
            + 'static,
    {
        Self {
            database: backend.clone(),
            channels: backend.clone(),
            processing: backend.clone(),
            locks: backend.clone(),
            mappings: backend,
        }
    }
}

/// Create the storage backend based on the configuration
///
/// Both backends share one underlying client or store across all traits, so
/// PostgreSQL uses a single connection pool.
///
/// # Errors
///
/// Returns an error if the storage client cannot be created
pub async fn create_storage(config: &RelayConfig) -> Result<Storage> {
    match config.database_target {
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                RelayError::Configuration(
                    "postgresql configuration is required when database_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL storage");
            let client = PostgreSQLClient::new(pg_config.clone()).await?;
            Ok(Storage::from_backend(Arc::new(PostgreSQLAdapter::new(client))))
        }
        DatabaseTarget::Memory => {
            tracing::warn!("Using in-memory storage; all state is lost on exit");
            Ok(Storage::from_backend(Arc::new(MemoryStore::new())))
        }
    }
}
