//! Entity persistence
//!
//! [`EntityStore`] is the only way services touch persisted state. Each
//! method is one unit of work; methods that write more than one row
//! (`save_migration_job` with a history entry, `record_sync`) are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Asset, Connection, ConnectionChanges, JobVersion, MigrationHistoryEntry, MigrationJob,
    NewAsset, NewConnection, NewHistoryEntry, NewMigrationJob,
};
use crate::error::Result;
use crate::query::{AssetFilter, ConnectionFilter, MigrationJobFilter};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert a connection with status `inactive`
    async fn insert_connection(
        &self,
        connection: NewConnection,
        now: DateTime<Utc>,
    ) -> Result<Connection>;

    async fn get_connection(&self, id: i32) -> Result<Option<Connection>>;

    /// Connections matching `filter`, ordered by id
    async fn list_connections(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>>;

    /// Apply `changes` and set `updated_at = now`. `None` if the id is unknown.
    async fn update_connection(
        &self,
        id: i32,
        changes: ConnectionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Connection>>;

    async fn insert_asset(&self, asset: NewAsset, now: DateTime<Utc>) -> Result<Asset>;

    /// Insert discovered assets and stamp the connection's `last_sync_at`
    async fn record_sync(
        &self,
        connection_id: i32,
        assets: Vec<NewAsset>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Asset>>;

    /// Assets matching `filter`, ordered by id
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>>;

    /// The subset of `ids` that exist, in no particular order
    async fn existing_asset_ids(&self, ids: &[i32]) -> Result<Vec<i32>>;

    /// Insert a job with status `pending` and progress 0
    async fn insert_migration_job(
        &self,
        job: NewMigrationJob,
        now: DateTime<Utc>,
    ) -> Result<MigrationJob>;

    async fn get_migration_job(&self, id: i32) -> Result<Option<MigrationJob>>;

    /// Jobs matching `filter`, ordered by id
    async fn list_migration_jobs(&self, filter: &MigrationJobFilter)
        -> Result<Vec<MigrationJob>>;

    /// Persist every mutable field of `job` and append `history` in the same
    /// unit of work. Fails with `InvalidState` if the stored job no longer
    /// matches `expected`.
    async fn save_migration_job(
        &self,
        job: &MigrationJob,
        expected: JobVersion,
        history: Option<NewHistoryEntry>,
    ) -> Result<MigrationJob>;

    /// History of one job, oldest first
    async fn list_history(&self, migration_job_id: i32) -> Result<Vec<MigrationHistoryEntry>>;
}
