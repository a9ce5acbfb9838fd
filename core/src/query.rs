//! List filters shared by the store backends
//!
//! Every filter field is optional and fields combine with AND. The same
//! filter value drives both the in-memory predicate and the SQL `WHERE`
//! clause, so both backends agree on what a query returns.

use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};

use crate::domain::{
    Asset, AssetType, BiTool, Connection, ConnectionStatus, DatabricksAssetType, MigrationJob,
    MigrationStatus,
};

/// A list filter over entities of type `T`
pub trait EntityFilter<T> {
    /// In-memory evaluation
    fn matches(&self, entity: &T) -> bool;

    /// Append the filter's conditions to a `SELECT ... FROM table` query
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>);
}

/// Joins equality conditions onto a query, emitting `WHERE` once and `AND`
/// between conditions.
struct Conditions<'a, 'args> {
    qb: &'a mut QueryBuilder<'args, Postgres>,
    empty: bool,
}

impl<'a, 'args> Conditions<'a, 'args> {
    fn new(qb: &'a mut QueryBuilder<'args, Postgres>) -> Self {
        Self { qb, empty: true }
    }

    fn eq_str(&mut self, column: &str, value: Option<&'static str>) -> &mut Self {
        if let Some(value) = value {
            self.separator();
            self.qb.push(column).push(" = ").push_bind(value);
        }
        self
    }

    fn eq_i32(&mut self, column: &str, value: Option<i32>) -> &mut Self {
        if let Some(value) = value {
            self.separator();
            self.qb.push(column).push(" = ").push_bind(value);
        }
        self
    }

    fn separator(&mut self) {
        self.qb.push(if self.empty { " WHERE " } else { " AND " });
        self.empty = false;
    }
}

fn matches_opt<V: PartialEq>(wanted: &Option<V>, actual: &V) -> bool {
    wanted.as_ref().map_or(true, |w| w == actual)
}

/// Connection list filter
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectionFilter {
    pub bi_tool: Option<BiTool>,
    pub status: Option<ConnectionStatus>,
}

impl EntityFilter<Connection> for ConnectionFilter {
    fn matches(&self, connection: &Connection) -> bool {
        matches_opt(&self.bi_tool, &connection.bi_tool)
            && matches_opt(&self.status, &connection.status)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        Conditions::new(qb)
            .eq_str("bi_tool", self.bi_tool.map(|t| t.as_str()))
            .eq_str("status", self.status.map(|s| s.as_str()));
    }
}

/// Asset list filter
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssetFilter {
    pub connection_id: Option<i32>,
    pub asset_type: Option<AssetType>,
}

impl EntityFilter<Asset> for AssetFilter {
    fn matches(&self, asset: &Asset) -> bool {
        matches_opt(&self.connection_id, &asset.connection_id)
            && matches_opt(&self.asset_type, &asset.asset_type)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        Conditions::new(qb)
            .eq_i32("connection_id", self.connection_id)
            .eq_str("asset_type", self.asset_type.map(|t| t.as_str()));
    }
}

/// Migration job list filter
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MigrationJobFilter {
    pub status: Option<MigrationStatus>,
    pub target_databricks_asset_type: Option<DatabricksAssetType>,
}

impl EntityFilter<MigrationJob> for MigrationJobFilter {
    fn matches(&self, job: &MigrationJob) -> bool {
        matches_opt(&self.status, &job.status)
            && matches_opt(
                &self.target_databricks_asset_type,
                &job.target_databricks_asset_type,
            )
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        Conditions::new(qb)
            .eq_str("status", self.status.map(|s| s.as_str()))
            .eq_str(
                "target_databricks_asset_type",
                self.target_databricks_asset_type.map(|t| t.as_str()),
            );
    }
}
