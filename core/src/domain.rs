//! Domain models for the BI migration service

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// Open-ended JSON object used for metadata and job configuration
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// BI product a connection points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiTool {
    Tableau,
    PowerBi,
    Looker,
}

impl BiTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiTool::Tableau => "tableau",
            BiTool::PowerBi => "powerbi",
            BiTool::Looker => "looker",
        }
    }
}

/// Health of a BI tool connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    /// Freshly created or manually disabled
    Inactive,
    /// Last connectivity test failed
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::Error => "error",
        }
    }
}

/// Kind of asset cataloged from a BI tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Report,
    Dashboard,
    DataSource,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Report => "report",
            AssetType::Dashboard => "dashboard",
            AssetType::DataSource => "data_source",
        }
    }
}

/// Databricks representation a migration job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabricksAssetType {
    UnityCatalogMetricView,
    AiBiDashboard,
    AiBiGenieSpace,
}

impl DatabricksAssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabricksAssetType::UnityCatalogMetricView => "unity_catalog_metric_view",
            DatabricksAssetType::AiBiDashboard => "ai_bi_dashboard",
            DatabricksAssetType::AiBiGenieSpace => "ai_bi_genie_space",
        }
    }
}

/// Status of a migration job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Created, not yet started
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Stopped by the user
    Cancelled,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, MigrationStatus::Pending | MigrationStatus::InProgress)
    }

    /// Whether a job may move from `self` to `next`
    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        match self {
            MigrationStatus::Pending => next != MigrationStatus::Pending,
            MigrationStatus::InProgress => next.is_terminal(),
            _ => false,
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ident, $label:literal, [$($variant:ident),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(CoreError::Validation(format!("Unknown {} '{}'", $label, s)))
            }
        }
    };
}

impl_str_enum!(BiTool, "BI tool", [Tableau, PowerBi, Looker]);
impl_str_enum!(ConnectionStatus, "connection status", [Active, Inactive, Error]);
impl_str_enum!(AssetType, "asset type", [Report, Dashboard, DataSource]);
impl_str_enum!(
    DatabricksAssetType,
    "Databricks asset type",
    [UnityCatalogMetricView, AiBiDashboard, AiBiGenieSpace]
);
impl_str_enum!(
    MigrationStatus,
    "migration status",
    [Pending, InProgress, Completed, Failed, Cancelled]
);

/// A connection to a BI tool instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: i32,
    pub name: String,
    pub bi_tool: BiTool,
    pub connection_url: String,
    /// Opaque, already-encrypted credential blob
    #[serde(rename = "credentials_encrypted", alias = "credentials")]
    pub credentials: String,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last successful connectivity test or asset sync
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Create connection input
#[derive(Debug, Clone, Deserialize)]
pub struct NewConnection {
    pub name: String,
    pub bi_tool: BiTool,
    pub connection_url: String,
    #[serde(alias = "credentials_encrypted")]
    pub credentials: String,
}

/// Partial connection update as supplied by callers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateConnection {
    pub name: Option<String>,
    pub connection_url: Option<String>,
    #[serde(alias = "credentials_encrypted")]
    pub credentials: Option<String>,
    pub status: Option<ConnectionStatus>,
}

/// Field changes applied to a stored connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionChanges {
    pub name: Option<String>,
    pub connection_url: Option<String>,
    pub credentials: Option<String>,
    pub status: Option<ConnectionStatus>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ConnectionChanges {
    pub fn status(status: ConnectionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

impl From<UpdateConnection> for ConnectionChanges {
    fn from(update: UpdateConnection) -> Self {
        Self {
            name: update.name,
            connection_url: update.connection_url,
            credentials: update.credentials,
            status: update.status,
            last_sync_at: None,
        }
    }
}

/// Outcome of a connectivity test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
}

impl ConnectionTestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A report, dashboard or data source cataloged from a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i32,
    pub connection_id: i32,
    /// Identifier in the source BI tool
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub asset_type: AssetType,
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub connection_id: i32,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub asset_type: AssetType,
    pub metadata: JsonMap,
}

/// A unit of work migrating assets to a Databricks representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub source_asset_ids: Vec<i32>,
    pub target_databricks_asset_type: DatabricksAssetType,
    pub status: MigrationStatus,
    pub transformation_config: Option<JsonMap>,
    pub mapping_config: Option<JsonMap>,
    pub error_message: Option<String>,
    pub progress_percentage: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set the first time the job enters `in_progress`
    pub started_at: Option<DateTime<Utc>>,
    /// Set the first time the job reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

/// Create migration job input
#[derive(Debug, Clone, Deserialize)]
pub struct NewMigrationJob {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_asset_ids: Vec<i32>,
    pub target_databricks_asset_type: DatabricksAssetType,
    #[serde(default)]
    pub transformation_config: Option<JsonMap>,
    #[serde(default)]
    pub mapping_config: Option<JsonMap>,
}

/// Partial migration job update
///
/// Nullable fields use `Option<Option<_>>`: absent leaves the stored value
/// alone, an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMigrationJob {
    pub status: Option<MigrationStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub error_message: Option<Option<String>>,
    pub progress_percentage: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub transformation_config: Option<Option<JsonMap>>,
    #[serde(default, deserialize_with = "nullable")]
    pub mapping_config: Option<Option<JsonMap>>,
}

fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One status change of a migration job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationHistoryEntry {
    pub id: i32,
    pub migration_job_id: i32,
    pub status: MigrationStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub migration_job_id: i32,
    pub status: MigrationStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The state a job was read in. Saves made against a stale read are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobVersion {
    pub status: MigrationStatus,
    pub updated_at: DateTime<Utc>,
}

impl JobVersion {
    pub fn of(job: &MigrationJob) -> Self {
        Self {
            status: job.status,
            updated_at: job.updated_at,
        }
    }

    pub fn matches(&self, job: &MigrationJob) -> bool {
        *self == Self::of(job)
    }
}
