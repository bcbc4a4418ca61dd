//! Database setup and shared handles

use std::sync::Arc;

use anyhow::{Context, Result};
use cataloguer_core::{CataloguerConfig, Clock, StoreBackend, SystemClock, TableLimits};
#[cfg(feature = "storage")]
use cataloguer_storage::{LocalStorage, ObjectStorage};
use chrono::Duration;

use super::catalogue::{BulkRepository, CatalogueItemRepository, CatalogueRepository};
use super::control::{InvitationRepository, OrganizationRepository, UserRepository};
use super::store::{KvStore, MemoryStore, PostgresStore};
use super::table::Table;

/// Store, clock and object-storage handles, created once at startup
#[derive(Clone)]
pub struct Database {
    table: Table,
    invitation_ttl: Duration,
    #[cfg(feature = "storage")]
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl Database {
    /// Connect the configured store and, when configured, local object storage.
    pub async fn connect(config: &CataloguerConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn KvStore> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store");
                Arc::new(MemoryStore::new(config.limits.max_transaction_items))
            }
            StoreBackend::Postgres => {
                tracing::info!(table = %config.store.table_name, "Connecting to database...");
                let store =
                    PostgresStore::connect(&config.store, config.limits.max_transaction_items)
                        .await
                        .context("Failed to connect to database")?;
                store
                    .ensure_table()
                    .await
                    .context("Failed to prepare catalogue table")?;
                tracing::info!(
                    max_connections = config.store.db_max_connections,
                    "Database connected successfully"
                );
                Arc::new(store)
            }
        };

        #[allow(unused_mut)]
        let mut database = Self::with_store(store, config.limits.clone(), Arc::new(SystemClock))
            .with_invitation_ttl(config.invitation_ttl());

        #[cfg(feature = "storage")]
        {
            if let Some(path) = &config.local_storage_path {
                let base_url = config
                    .local_storage_base_url
                    .clone()
                    .unwrap_or_else(|| "/images".to_string());
                let storage = LocalStorage::new(path, base_url)
                    .await
                    .context("Failed to initialise local storage")?;
                tracing::info!(path = %path, "Local object storage enabled");
                database = database.with_storage(Arc::new(storage));
            }
        }

        Ok(database)
    }

    /// Wrap an existing store; used by tests and embedding hosts.
    pub fn with_store(store: Arc<dyn KvStore>, limits: TableLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Table::new(store, limits, clock),
            invitation_ttl: Duration::days(cataloguer_core::models::INVITATION_TTL_DAYS),
            #[cfg(feature = "storage")]
            storage: None,
        }
    }

    pub fn with_invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    #[cfg(feature = "storage")]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.table.clone())
    }

    pub fn organizations(&self) -> OrganizationRepository {
        OrganizationRepository::new(self.table.clone())
    }

    pub fn invitations(&self) -> InvitationRepository {
        InvitationRepository::new(self.table.clone()).with_ttl(self.invitation_ttl)
    }

    pub fn catalogues(&self) -> CatalogueRepository {
        CatalogueRepository::new(self.table.clone())
    }

    pub fn items(&self) -> CatalogueItemRepository {
        let repository = CatalogueItemRepository::new(self.table.clone());
        #[cfg(feature = "storage")]
        let repository = match &self.storage {
            Some(storage) => repository.with_storage(storage.clone()),
            None => repository,
        };
        repository
    }

    pub fn bulk(&self) -> BulkRepository {
        BulkRepository::new(self.table.clone())
    }

    /// Close the store; handles cloned from this database stop working.
    pub async fn shutdown(&self) {
        tracing::info!(backend = self.table.store().backend(), "Closing store");
        self.table.close().await;
    }
}
