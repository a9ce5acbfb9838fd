//! Application state

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use bi_migration_core::adapter::{BiToolAdapter, SimulatedBiAdapter};
use bi_migration_core::store::{EntityStore, MemoryStore, PostgresStore};

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Entity store shared by all handlers
    pub store: Arc<dyn EntityStore>,
    /// BI tool integration
    pub adapter: Arc<dyn BiToolAdapter>,
    /// Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Create new application state
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn EntityStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url, config.database_max_connections).await?;
                if config.run_migrations {
                    store.migrate().await?;
                }
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL is not set; using the in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::with_store(store, config))
    }

    /// State over an existing store, with the simulated BI adapter
    pub fn with_store(store: Arc<dyn EntityStore>, config: &AppConfig) -> Self {
        Self {
            store,
            adapter: Arc::new(SimulatedBiAdapter::new()),
            config: Arc::new(config.clone()),
        }
    }
}
