//! Simulated BI tool adapter
//!
//! Stands in for real Tableau / Power BI / Looker clients. Probe outcomes
//! are keyed off keywords in the connection name so failures can be
//! exercised without a live BI server.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::adapter::{BiToolAdapter, ProbeOutcome, UploadedWorkbook, WorkbookFormat};
use crate::domain::{AssetType, Connection, JsonMap, NewAsset};
use crate::error::Result;

/// Adapter that fabricates BI tool responses
#[derive(Debug, Default)]
pub struct SimulatedBiAdapter {
    /// Distinguishes syncs that land in the same millisecond
    sync_counter: AtomicU64,
}

impl SimulatedBiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sync_token(&self) -> String {
        let seq = self.sync_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", Utc::now().timestamp_millis(), seq)
    }
}

fn to_map(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

#[async_trait]
impl BiToolAdapter for SimulatedBiAdapter {
    async fn probe(&self, connection: &Connection) -> Result<ProbeOutcome> {
        let name = connection.name.to_lowercase();
        let outcome = if name.contains("invalid") {
            ProbeOutcome::AuthenticationFailed
        } else if name.contains("network") {
            ProbeOutcome::NetworkFailure
        } else if name.contains("timeout") {
            ProbeOutcome::Timeout
        } else {
            ProbeOutcome::Connected
        };
        Ok(outcome)
    }

    async fn discover_assets(&self, connection: &Connection) -> Result<Vec<NewAsset>> {
        let token = self.next_sync_token();
        let now = Utc::now().to_rfc3339();

        let discovered = [
            (AssetType::Report, "Report", "reports"),
            (AssetType::Dashboard, "Dashboard", "dashboards"),
        ];

        Ok(discovered
            .into_iter()
            .map(|(asset_type, label, path)| NewAsset {
                connection_id: connection.id,
                external_id: format!("ext_{}_{}_1", token, asset_type.as_str()),
                name: format!("Synced {} {}", label, token),
                description: Some(format!(
                    "A {} synced from {}",
                    label.to_lowercase(),
                    connection.bi_tool
                )),
                asset_type,
                metadata: to_map(json!({
                    "owner": "system",
                    "last_modified": now,
                    "source_url": format!("{}/{}/1", connection.connection_url.trim_end_matches('/'), path),
                })),
            })
            .collect())
    }

    async fn extract_workbook_metadata(&self, workbook: &UploadedWorkbook) -> Result<JsonMap> {
        let metadata = match workbook.format {
            WorkbookFormat::TableauWorkbook => json!({
                "workbook_name": workbook.stem,
                "tableau_version": "2023.3",
                "data_sources": 3,
                "worksheets": 8,
                "dashboards": 2,
                "author": "uploaded",
                "size_bytes": workbook.size_bytes,
            }),
            WorkbookFormat::PowerBiReport => json!({
                "report_name": workbook.stem,
                "powerbi_version": "2.124",
                "pages": 5,
                "visuals": 24,
                "data_sources": 2,
                "author": "uploaded",
                "size_bytes": workbook.size_bytes,
            }),
        };
        Ok(to_map(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BiTool, ConnectionStatus};

    fn connection(name: &str) -> Connection {
        let now = Utc::now();
        Connection {
            id: 3,
            name: name.to_string(),
            bi_tool: BiTool::Looker,
            connection_url: "https://looker.example.com/".to_string(),
            credentials: "creds".to_string(),
            status: ConnectionStatus::Active,
            created_at: now,
            updated_at: now,
            last_sync_at: None,
        }
    }

    #[tokio::test]
    async fn test_probe_keywords_are_case_insensitive() {
        let adapter = SimulatedBiAdapter::new();
        let cases = [
            ("Invalid Auth Connection", ProbeOutcome::AuthenticationFailed),
            ("Network Failure Connection", ProbeOutcome::NetworkFailure),
            ("TIMEOUT test", ProbeOutcome::Timeout),
            ("Looker Connection", ProbeOutcome::Connected),
        ];
        for (name, expected) in cases {
            assert_eq!(adapter.probe(&connection(name)).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_discover_assets_unique_across_calls() {
        let adapter = SimulatedBiAdapter::new();
        let conn = connection("Looker Connection");

        let first = adapter.discover_assets(&conn).await.unwrap();
        let second = adapter.discover_assets(&conn).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].asset_type, AssetType::Report);
        assert_eq!(first[1].asset_type, AssetType::Dashboard);
        assert_eq!(
            first[0].metadata["source_url"],
            "https://looker.example.com/reports/1"
        );
        for a in &first {
            assert_eq!(a.connection_id, 3);
            assert!(second.iter().all(|b| b.external_id != a.external_id));
        }
    }

    #[tokio::test]
    async fn test_extract_workbook_metadata() {
        let adapter = SimulatedBiAdapter::new();
        let metadata = adapter
            .extract_workbook_metadata(&UploadedWorkbook {
                format: WorkbookFormat::PowerBiReport,
                stem: "Quarterly Sales".to_string(),
                size_bytes: 2048,
            })
            .await
            .unwrap();

        assert_eq!(metadata["report_name"], "Quarterly Sales");
        assert_eq!(metadata["size_bytes"], 2048);
    }
}
