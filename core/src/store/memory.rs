//! In-process store
//!
//! Backs the API server when no database is configured, and the service
//! tests. All tables sit behind one lock so multi-row writes are atomic.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    Asset, Connection, ConnectionChanges, ConnectionStatus, JobVersion, MigrationHistoryEntry,
    MigrationJob, MigrationStatus, NewAsset, NewConnection, NewHistoryEntry, NewMigrationJob,
};
use crate::error::{CoreError, Result};
use crate::query::{AssetFilter, ConnectionFilter, EntityFilter, MigrationJobFilter};
use crate::store::EntityStore;

/// A table keyed by serial id
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i32, T>,
    next_id: i32,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    fn insert_with(&mut self, build: impl FnOnce(i32) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn select<F: EntityFilter<T>>(&self, filter: &F) -> Vec<T> {
        self.rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Tables {
    connections: Table<Connection>,
    assets: Table<Asset>,
    migration_jobs: Table<MigrationJob>,
    migration_history: Table<MigrationHistoryEntry>,
}

impl Tables {
    fn insert_asset(&mut self, asset: NewAsset, now: DateTime<Utc>) -> Asset {
        self.assets.insert_with(|id| Asset {
            id,
            connection_id: asset.connection_id,
            external_id: asset.external_id,
            name: asset.name,
            description: asset.description,
            asset_type: asset.asset_type,
            metadata: asset.metadata,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Store that keeps every table in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_connection(
        &self,
        connection: NewConnection,
        now: DateTime<Utc>,
    ) -> Result<Connection> {
        let mut tables = self.tables.write().await;
        Ok(tables.connections.insert_with(|id| Connection {
            id,
            name: connection.name,
            bi_tool: connection.bi_tool,
            connection_url: connection.connection_url,
            credentials: connection.credentials,
            status: ConnectionStatus::Inactive,
            created_at: now,
            updated_at: now,
            last_sync_at: None,
        }))
    }

    async fn get_connection(&self, id: i32) -> Result<Option<Connection>> {
        Ok(self.tables.read().await.connections.rows.get(&id).cloned())
    }

    async fn list_connections(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>> {
        Ok(self.tables.read().await.connections.select(filter))
    }

    async fn update_connection(
        &self,
        id: i32,
        changes: ConnectionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Connection>> {
        let mut tables = self.tables.write().await;
        let Some(connection) = tables.connections.rows.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            connection.name = name;
        }
        if let Some(url) = changes.connection_url {
            connection.connection_url = url;
        }
        if let Some(credentials) = changes.credentials {
            connection.credentials = credentials;
        }
        if let Some(status) = changes.status {
            connection.status = status;
        }
        if let Some(last_sync_at) = changes.last_sync_at {
            connection.last_sync_at = Some(last_sync_at);
        }
        connection.updated_at = now;

        Ok(Some(connection.clone()))
    }

    async fn insert_asset(&self, asset: NewAsset, now: DateTime<Utc>) -> Result<Asset> {
        Ok(self.tables.write().await.insert_asset(asset, now))
    }

    async fn record_sync(
        &self,
        connection_id: i32,
        assets: Vec<NewAsset>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Asset>> {
        let mut tables = self.tables.write().await;
        let connection = tables
            .connections
            .rows
            .get_mut(&connection_id)
            .ok_or_else(|| CoreError::connection_not_found(connection_id))?;
        connection.last_sync_at = Some(now);
        connection.updated_at = now;

        Ok(assets
            .into_iter()
            .map(|asset| tables.insert_asset(asset, now))
            .collect())
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        Ok(self.tables.read().await.assets.select(filter))
    }

    async fn existing_asset_ids(&self, ids: &[i32]) -> Result<Vec<i32>> {
        let tables = self.tables.read().await;
        let unique: HashSet<i32> = ids.iter().copied().collect();
        Ok(unique
            .into_iter()
            .filter(|id| tables.assets.rows.contains_key(id))
            .collect())
    }

    async fn insert_migration_job(
        &self,
        job: NewMigrationJob,
        now: DateTime<Utc>,
    ) -> Result<MigrationJob> {
        let mut tables = self.tables.write().await;
        Ok(tables.migration_jobs.insert_with(|id| MigrationJob {
            id,
            name: job.name,
            description: job.description,
            source_asset_ids: job.source_asset_ids,
            target_databricks_asset_type: job.target_databricks_asset_type,
            status: MigrationStatus::Pending,
            transformation_config: job.transformation_config,
            mapping_config: job.mapping_config,
            error_message: None,
            progress_percentage: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }))
    }

    async fn get_migration_job(&self, id: i32) -> Result<Option<MigrationJob>> {
        Ok(self.tables.read().await.migration_jobs.rows.get(&id).cloned())
    }

    async fn list_migration_jobs(
        &self,
        filter: &MigrationJobFilter,
    ) -> Result<Vec<MigrationJob>> {
        Ok(self.tables.read().await.migration_jobs.select(filter))
    }

    async fn save_migration_job(
        &self,
        job: &MigrationJob,
        expected: JobVersion,
        history: Option<NewHistoryEntry>,
    ) -> Result<MigrationJob> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .migration_jobs
            .rows
            .get_mut(&job.id)
            .ok_or_else(|| CoreError::migration_job_not_found(job.id))?;
        if !expected.matches(stored) {
            return Err(CoreError::stale_migration_job(job.id));
        }
        // created_at and the asset list are fixed at creation
        stored.name = job.name.clone();
        stored.description = job.description.clone();
        stored.target_databricks_asset_type = job.target_databricks_asset_type;
        stored.status = job.status;
        stored.transformation_config = job.transformation_config.clone();
        stored.mapping_config = job.mapping_config.clone();
        stored.error_message = job.error_message.clone();
        stored.progress_percentage = job.progress_percentage;
        stored.updated_at = job.updated_at;
        stored.started_at = job.started_at;
        stored.completed_at = job.completed_at;
        let saved = stored.clone();

        if let Some(entry) = history {
            tables
                .migration_history
                .insert_with(|id| MigrationHistoryEntry {
                    id,
                    migration_job_id: entry.migration_job_id,
                    status: entry.status,
                    message: entry.message,
                    created_at: entry.created_at,
                });
        }

        Ok(saved)
    }

    async fn list_history(&self, migration_job_id: i32) -> Result<Vec<MigrationHistoryEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<MigrationHistoryEntry> = tables
            .migration_history
            .rows
            .values()
            .filter(|entry| entry.migration_job_id == migration_job_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.created_at, entry.id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetType, BiTool, DatabricksAssetType, JsonMap};

    fn new_connection(name: &str, bi_tool: BiTool) -> NewConnection {
        NewConnection {
            name: name.to_string(),
            bi_tool,
            connection_url: "https://bi.example.com".to_string(),
            credentials: "creds".to_string(),
        }
    }

    fn new_asset(connection_id: i32, external_id: &str, asset_type: AssetType) -> NewAsset {
        NewAsset {
            connection_id,
            external_id: external_id.to_string(),
            name: external_id.to_string(),
            description: None,
            asset_type,
            metadata: JsonMap::new(),
        }
    }

    #[tokio::test]
    async fn test_serial_ids_per_table() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = store
            .insert_connection(new_connection("a", BiTool::Tableau), now)
            .await
            .unwrap();
        let b = store
            .insert_connection(new_connection("b", BiTool::Looker), now)
            .await
            .unwrap();
        let asset = store
            .insert_asset(new_asset(a.id, "ext-1", AssetType::Report), now)
            .await
            .unwrap();

        assert_eq!((a.id, b.id, asset.id), (1, 2, 1));
        assert_eq!(a.status, ConnectionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_update_unknown_connection_returns_none() {
        let store = MemoryStore::new();
        let result = store
            .update_connection(7, ConnectionChanges::default(), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_record_sync_touches_connection() {
        let store = MemoryStore::new();
        let created = Utc::now();
        let connection = store
            .insert_connection(new_connection("a", BiTool::PowerBi), created)
            .await
            .unwrap();

        let synced_at = created + chrono::Duration::seconds(5);
        let assets = store
            .record_sync(
                connection.id,
                vec![
                    new_asset(connection.id, "r", AssetType::Report),
                    new_asset(connection.id, "d", AssetType::Dashboard),
                ],
                synced_at,
            )
            .await
            .unwrap();

        assert_eq!(assets.len(), 2);
        let connection = store.get_connection(connection.id).await.unwrap().unwrap();
        assert_eq!(connection.last_sync_at, Some(synced_at));
        assert_eq!(connection.updated_at, synced_at);
    }

    #[tokio::test]
    async fn test_record_sync_unknown_connection_inserts_nothing() {
        let store = MemoryStore::new();
        let err = store
            .record_sync(9, vec![new_asset(9, "r", AssetType::Report)], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { id: 9, .. }));
        assert!(store
            .list_assets(&AssetFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_existing_asset_ids() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for ext in ["a", "b"] {
            store
                .insert_asset(new_asset(1, ext, AssetType::Report), now)
                .await
                .unwrap();
        }
        let mut found = store.existing_asset_ids(&[2, 5, 1, 2]).await.unwrap();
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_save_job_with_history_is_visible_together() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut job = store
            .insert_migration_job(
                NewMigrationJob {
                    name: "job".to_string(),
                    description: None,
                    source_asset_ids: vec![1],
                    target_databricks_asset_type: DatabricksAssetType::AiBiDashboard,
                    transformation_config: None,
                    mapping_config: None,
                },
                now,
            )
            .await
            .unwrap();
        let version = JobVersion::of(&job);

        job.status = MigrationStatus::InProgress;
        job.started_at = Some(now);
        let saved = store
            .save_migration_job(
                &job,
                version,
                Some(NewHistoryEntry {
                    migration_job_id: job.id,
                    status: MigrationStatus::InProgress,
                    message: Some("Status changed to in_progress".to_string()),
                    created_at: now,
                }),
            )
            .await
            .unwrap();

        assert_eq!(saved.status, MigrationStatus::InProgress);
        let history = store.list_history(job.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MigrationStatus::InProgress);
        assert!(store.list_history(job.id + 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_against_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let created = Utc::now();
        let job = store
            .insert_migration_job(
                NewMigrationJob {
                    name: "job".to_string(),
                    description: None,
                    source_asset_ids: vec![1],
                    target_databricks_asset_type: DatabricksAssetType::AiBiGenieSpace,
                    transformation_config: None,
                    mapping_config: None,
                },
                created,
            )
            .await
            .unwrap();
        let read = JobVersion::of(&job);

        let mut cancelled = job.clone();
        cancelled.status = MigrationStatus::Cancelled;
        cancelled.updated_at = created + chrono::Duration::seconds(1);
        cancelled.completed_at = Some(cancelled.updated_at);
        store
            .save_migration_job(&cancelled, read, None)
            .await
            .unwrap();

        let mut progressed = job.clone();
        progressed.progress_percentage = 40;
        progressed.updated_at = created + chrono::Duration::seconds(2);
        let err = store
            .save_migration_job(
                &progressed,
                read,
                Some(NewHistoryEntry {
                    migration_job_id: job.id,
                    status: MigrationStatus::InProgress,
                    message: None,
                    created_at: progressed.updated_at,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidState(_)));
        let stored = store.get_migration_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored, cancelled);
        assert!(store.list_history(job.id).await.unwrap().is_empty());
    }
}
