//! BI tool adapter abstraction
//!
//! Everything that would talk to a real Tableau, Power BI or Looker
//! instance goes through [`BiToolAdapter`]. The services own the decision
//! logic around these calls (which checks run first, what gets persisted);
//! adapters only answer the questions.

use async_trait::async_trait;

use crate::domain::{AssetType, BiTool, Connection, JsonMap, NewAsset};
use crate::error::Result;

pub mod simulated;

pub use simulated::SimulatedBiAdapter;

/// Result of a connectivity probe against a BI tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected,
    AuthenticationFailed,
    NetworkFailure,
    Timeout,
}

impl ProbeOutcome {
    /// Message reported for a failed probe
    pub fn failure_message(&self) -> Option<&'static str> {
        match self {
            ProbeOutcome::Connected => None,
            ProbeOutcome::AuthenticationFailed => Some("Authentication failed"),
            ProbeOutcome::NetworkFailure => Some("Network connection failed"),
            ProbeOutcome::Timeout => Some("Connection timeout"),
        }
    }
}

/// Uploaded workbook formats that can be registered as assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Packaged Tableau workbook (`.twbx`)
    TableauWorkbook,
    /// Power BI report (`.pbi` / `.pbix`)
    PowerBiReport,
}

impl WorkbookFormat {
    /// Format for a lowercase file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "twbx" => Some(WorkbookFormat::TableauWorkbook),
            "pbi" | "pbix" => Some(WorkbookFormat::PowerBiReport),
            _ => None,
        }
    }

    pub fn bi_tool(&self) -> BiTool {
        match self {
            WorkbookFormat::TableauWorkbook => BiTool::Tableau,
            WorkbookFormat::PowerBiReport => BiTool::PowerBi,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            WorkbookFormat::TableauWorkbook => AssetType::Dashboard,
            WorkbookFormat::PowerBiReport => AssetType::Report,
        }
    }
}

/// An uploaded workbook file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedWorkbook {
    pub format: WorkbookFormat,
    /// File name without its extension
    pub stem: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait BiToolAdapter: Send + Sync {
    /// Try to reach the BI tool with the connection's stored credentials.
    ///
    /// `Err` means the probe itself broke, not that the tool refused us.
    async fn probe(&self, connection: &Connection) -> Result<ProbeOutcome>;

    /// List the assets currently published on the BI tool
    async fn discover_assets(&self, connection: &Connection) -> Result<Vec<NewAsset>>;

    /// Pull descriptive metadata out of an uploaded workbook
    async fn extract_workbook_metadata(&self, workbook: &UploadedWorkbook) -> Result<JsonMap>;
}
