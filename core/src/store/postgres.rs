//! PostgreSQL store implementation

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::domain::{
    Asset, Connection, ConnectionChanges, JobVersion, JsonMap, MigrationHistoryEntry, MigrationJob,
    NewAsset, NewConnection, NewHistoryEntry, NewMigrationJob,
};
use crate::error::{CoreError, Result};
use crate::query::{AssetFilter, ConnectionFilter, EntityFilter, MigrationJobFilter};
use crate::store::EntityStore;

const CONNECTION_COLUMNS: &str = "id, name, bi_tool, connection_url, credentials_encrypted, \
     status, created_at, updated_at, last_sync_at";

const ASSET_COLUMNS: &str = "id, connection_id, external_id, name, description, asset_type, \
     metadata, created_at, updated_at";

const MIGRATION_JOB_COLUMNS: &str = "id, name, description, source_asset_ids, \
     target_databricks_asset_type, status, transformation_config, mapping_config, \
     error_message, progress_percentage, created_at, updated_at, started_at, completed_at";

const HISTORY_COLUMNS: &str = "id, migration_job_id, status, message, created_at";

/// Store backed by a PostgreSQL database
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select_with<T, F>(
        &self,
        columns: &str,
        table: &str,
        filter: &F,
        map: fn(&PgRow) -> Result<T>,
    ) -> Result<Vec<T>>
    where
        F: EntityFilter<T> + Sync,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM {}", columns, table));
        filter.push_where(&mut qb);
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }
}

/// Parse a text-encoded enum column
fn enum_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = CoreError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|_| {
        CoreError::Internal(format!("Unexpected value '{}' in column {}", raw, column))
    })
}

fn row_to_connection(row: &PgRow) -> Result<Connection> {
    Ok(Connection {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        bi_tool: enum_column(row, "bi_tool")?,
        connection_url: row.try_get("connection_url")?,
        credentials: row.try_get("credentials_encrypted")?,
        status: enum_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_sync_at: row.try_get("last_sync_at")?,
    })
}

fn row_to_asset(row: &PgRow) -> Result<Asset> {
    let Json(metadata): Json<JsonMap> = row.try_get("metadata")?;
    Ok(Asset {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        asset_type: enum_column(row, "asset_type")?,
        metadata,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_migration_job(row: &PgRow) -> Result<MigrationJob> {
    let transformation_config: Option<Json<JsonMap>> = row.try_get("transformation_config")?;
    let mapping_config: Option<Json<JsonMap>> = row.try_get("mapping_config")?;
    Ok(MigrationJob {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        source_asset_ids: row.try_get("source_asset_ids")?,
        target_databricks_asset_type: enum_column(row, "target_databricks_asset_type")?,
        status: enum_column(row, "status")?,
        transformation_config: transformation_config.map(|Json(config)| config),
        mapping_config: mapping_config.map(|Json(config)| config),
        error_message: row.try_get("error_message")?,
        progress_percentage: row.try_get("progress_percentage")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_history(row: &PgRow) -> Result<MigrationHistoryEntry> {
    Ok(MigrationHistoryEntry {
        id: row.try_get("id")?,
        migration_job_id: row.try_get("migration_job_id")?,
        status: enum_column(row, "status")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn insert_asset_sql() -> String {
    format!(
        r#"
        INSERT INTO assets
            (connection_id, external_id, name, description, asset_type, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING {}
        "#,
        ASSET_COLUMNS
    )
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn insert_connection(
        &self,
        connection: NewConnection,
        now: DateTime<Utc>,
    ) -> Result<Connection> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO connections
                (name, bi_tool, connection_url, credentials_encrypted, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'inactive', $5, $5)
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(&connection.name)
        .bind(connection.bi_tool.as_str())
        .bind(&connection.connection_url)
        .bind(&connection.credentials)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_connection(&row)
    }

    async fn get_connection(&self, id: i32) -> Result<Option<Connection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM connections WHERE id = $1",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_connection).transpose()
    }

    async fn list_connections(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>> {
        self.select_with(CONNECTION_COLUMNS, "connections", filter, row_to_connection)
            .await
    }

    async fn update_connection(
        &self,
        id: i32,
        changes: ConnectionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Connection>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE connections
            SET name = COALESCE($2, name),
                connection_url = COALESCE($3, connection_url),
                credentials_encrypted = COALESCE($4, credentials_encrypted),
                status = COALESCE($5, status),
                last_sync_at = COALESCE($6, last_sync_at),
                updated_at = $7
            WHERE id = $1
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.connection_url)
        .bind(changes.credentials)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.last_sync_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_connection).transpose()
    }

    async fn insert_asset(&self, asset: NewAsset, now: DateTime<Utc>) -> Result<Asset> {
        let row = sqlx::query(&insert_asset_sql())
            .bind(asset.connection_id)
            .bind(&asset.external_id)
            .bind(&asset.name)
            .bind(&asset.description)
            .bind(asset.asset_type.as_str())
            .bind(Json(&asset.metadata))
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        row_to_asset(&row)
    }

    async fn record_sync(
        &self,
        connection_id: i32,
        assets: Vec<NewAsset>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Asset>> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE connections SET last_sync_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(connection_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(CoreError::connection_not_found(connection_id));
        }

        let sql = insert_asset_sql();
        let mut inserted = Vec::with_capacity(assets.len());
        for asset in &assets {
            let row = sqlx::query(&sql)
                .bind(asset.connection_id)
                .bind(&asset.external_id)
                .bind(&asset.name)
                .bind(&asset.description)
                .bind(asset.asset_type.as_str())
                .bind(Json(&asset.metadata))
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(row_to_asset(&row)?);
        }

        tx.commit().await?;
        debug!(
            "Recorded sync of {} assets for connection {}",
            inserted.len(),
            connection_id
        );
        Ok(inserted)
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        self.select_with(ASSET_COLUMNS, "assets", filter, row_to_asset)
            .await
    }

    async fn existing_asset_ids(&self, ids: &[i32]) -> Result<Vec<i32>> {
        let found = sqlx::query_scalar::<_, i32>("SELECT id FROM assets WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(found)
    }

    async fn insert_migration_job(
        &self,
        job: NewMigrationJob,
        now: DateTime<Utc>,
    ) -> Result<MigrationJob> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO migration_jobs
                (name, description, source_asset_ids, target_databricks_asset_type, status,
                 transformation_config, mapping_config, progress_percentage, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, 0, $7, $7)
            RETURNING {}
            "#,
            MIGRATION_JOB_COLUMNS
        ))
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.source_asset_ids)
        .bind(job.target_databricks_asset_type.as_str())
        .bind(job.transformation_config.as_ref().map(Json))
        .bind(job.mapping_config.as_ref().map(Json))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_migration_job(&row)
    }

    async fn get_migration_job(&self, id: i32) -> Result<Option<MigrationJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM migration_jobs WHERE id = $1",
            MIGRATION_JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_migration_job).transpose()
    }

    async fn list_migration_jobs(
        &self,
        filter: &MigrationJobFilter,
    ) -> Result<Vec<MigrationJob>> {
        self.select_with(
            MIGRATION_JOB_COLUMNS,
            "migration_jobs",
            filter,
            row_to_migration_job,
        )
        .await
    }

    async fn save_migration_job(
        &self,
        job: &MigrationJob,
        expected: JobVersion,
        history: Option<NewHistoryEntry>,
    ) -> Result<MigrationJob> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE migration_jobs
            SET name = $2,
                description = $3,
                target_databricks_asset_type = $4,
                status = $5,
                transformation_config = $6,
                mapping_config = $7,
                error_message = $8,
                progress_percentage = $9,
                updated_at = $10,
                started_at = $11,
                completed_at = $12
            WHERE id = $1 AND status = $13 AND updated_at = $14
            RETURNING {}
            "#,
            MIGRATION_JOB_COLUMNS
        ))
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(job.target_databricks_asset_type.as_str())
        .bind(job.status.as_str())
        .bind(job.transformation_config.as_ref().map(Json))
        .bind(job.mapping_config.as_ref().map(Json))
        .bind(&job.error_message)
        .bind(job.progress_percentage)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(expected.status.as_str())
        .bind(expected.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM migration_jobs WHERE id = $1)")
                    .bind(job.id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(if exists {
                CoreError::stale_migration_job(job.id)
            } else {
                CoreError::migration_job_not_found(job.id)
            });
        };
        let saved = row_to_migration_job(&row)?;

        if let Some(entry) = history {
            sqlx::query(
                r#"
                INSERT INTO migration_history (migration_job_id, status, message, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(entry.migration_job_id)
            .bind(entry.status.as_str())
            .bind(&entry.message)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn list_history(&self, migration_job_id: i32) -> Result<Vec<MigrationHistoryEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM migration_history
            WHERE migration_job_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
            HISTORY_COLUMNS
        ))
        .bind(migration_job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }
}
