//! Connection management: CRUD, connectivity tests and asset sync

use chrono::Utc;
use tracing::{error, info, warn};
use url::Url;

use crate::adapter::BiToolAdapter;
use crate::domain::{
    Asset, Connection, ConnectionChanges, ConnectionStatus, ConnectionTestResult, NewConnection,
    UpdateConnection,
};
use crate::error::{CoreError, Result};
use crate::query::ConnectionFilter;
use crate::store::EntityStore;

fn is_valid_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

/// Collects field problems so one error can name all of them
#[derive(Default)]
struct FieldErrors(Vec<String>);

impl FieldErrors {
    fn not_blank(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if value.is_some_and(|v| v.trim().is_empty()) {
            self.0.push(format!("{} must not be empty", field));
        }
        self
    }

    fn url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            if !is_valid_url(v) {
                self.0.push(format!("{} '{}' is not a valid URL", field, v));
            }
        }
        self
    }

    fn finish(&mut self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self.0.join("; ")))
        }
    }
}

/// Register a new connection. It starts out `inactive` until tested.
pub async fn create_connection<S>(store: &S, input: NewConnection) -> Result<Connection>
where
    S: EntityStore + ?Sized,
{
    FieldErrors::default()
        .not_blank("name", Some(&input.name))
        .not_blank("connection_url", Some(&input.connection_url))
        .url("connection_url", Some(&input.connection_url))
        .not_blank("credentials", Some(&input.credentials))
        .finish()?;

    let connection = store.insert_connection(input, Utc::now()).await?;
    info!(
        "Created {} connection {} ({})",
        connection.bi_tool, connection.id, connection.name
    );
    Ok(connection)
}

pub async fn get_connections<S>(store: &S, filter: &ConnectionFilter) -> Result<Vec<Connection>>
where
    S: EntityStore + ?Sized,
{
    store.list_connections(filter).await
}

/// Merge the provided fields into a connection
pub async fn update_connection<S>(store: &S, id: i32, input: UpdateConnection) -> Result<Connection>
where
    S: EntityStore + ?Sized,
{
    FieldErrors::default()
        .not_blank("name", input.name.as_deref())
        .not_blank("connection_url", input.connection_url.as_deref())
        .url("connection_url", input.connection_url.as_deref())
        .not_blank("credentials", input.credentials.as_deref())
        .finish()?;

    store
        .update_connection(id, input.into(), Utc::now())
        .await?
        .ok_or_else(|| CoreError::connection_not_found(id))
}

/// Probe a connection and record the outcome on its status.
///
/// Never fails: unexpected errors are reported in the result and the
/// connection is marked `error`.
pub async fn test_connection<S, A>(store: &S, adapter: &A, id: i32) -> ConnectionTestResult
where
    S: EntityStore + ?Sized,
    A: BiToolAdapter + ?Sized,
{
    match run_connection_test(store, adapter, id).await {
        Ok(result) => result,
        Err(e) => {
            error!("Connection test for connection {} failed: {}", id, e);
            let mark_error = store
                .update_connection(id, ConnectionChanges::status(ConnectionStatus::Error), Utc::now())
                .await;
            if let Err(update_err) = mark_error {
                error!(
                    "Failed to mark connection {} as errored: {}",
                    id, update_err
                );
            }
            ConnectionTestResult::failed(format!("Connection test failed: {}", e))
        }
    }
}

async fn run_connection_test<S, A>(store: &S, adapter: &A, id: i32) -> Result<ConnectionTestResult>
where
    S: EntityStore + ?Sized,
    A: BiToolAdapter + ?Sized,
{
    let Some(connection) = store.get_connection(id).await? else {
        return Ok(ConnectionTestResult::failed("Connection not found"));
    };

    if connection.status == ConnectionStatus::Error {
        return Ok(ConnectionTestResult::failed("Connection is in error state"));
    }

    let failure = if !is_valid_url(&connection.connection_url) {
        Some("Invalid connection URL")
    } else if connection.credentials.trim().is_empty() {
        Some("Missing or invalid credentials")
    } else {
        adapter.probe(&connection).await?.failure_message()
    };

    let now = Utc::now();
    match failure {
        Some(message) => {
            warn!("Connection {} test failed: {}", id, message);
            store
                .update_connection(id, ConnectionChanges::status(ConnectionStatus::Error), now)
                .await?;
            Ok(ConnectionTestResult::failed(message))
        }
        None => {
            let changes = ConnectionChanges {
                status: Some(ConnectionStatus::Active),
                last_sync_at: Some(now),
                ..Default::default()
            };
            store.update_connection(id, changes, now).await?;
            info!("Connection {} is active", id);
            Ok(ConnectionTestResult::ok(format!(
                "Successfully connected to {} at {}",
                connection.bi_tool, connection.connection_url
            )))
        }
    }
}

/// Pull the current asset list from an active connection
pub async fn sync_assets<S, A>(store: &S, adapter: &A, id: i32) -> Result<Vec<Asset>>
where
    S: EntityStore + ?Sized,
    A: BiToolAdapter + ?Sized,
{
    let connection = store
        .get_connection(id)
        .await?
        .ok_or_else(|| CoreError::connection_not_found(id))?;

    if connection.status != ConnectionStatus::Active {
        return Err(CoreError::InvalidState(format!(
            "Connection {} is not active. Status: {}",
            id, connection.status
        )));
    }

    let discovered = adapter.discover_assets(&connection).await?;
    let assets = store.record_sync(id, discovered, Utc::now()).await?;
    info!("Synced {} assets from connection {}", assets.len(), id);
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::adapter::SimulatedBiAdapter;
    use crate::domain::BiTool;
    use crate::query::AssetFilter;
    use crate::store::mock::MockStore;
    use crate::store::MemoryStore;

    fn input(name: &str, url: &str, credentials: &str) -> NewConnection {
        NewConnection {
            name: name.to_string(),
            bi_tool: BiTool::Tableau,
            connection_url: url.to_string(),
            credentials: credentials.to_string(),
        }
    }

    async fn stored(store: &MemoryStore, name: &str, url: &str, credentials: &str) -> Connection {
        // insert directly so malformed records can be set up
        store
            .insert_connection(input(name, url, credentials), Utc::now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_connection_starts_inactive() {
        let store = MemoryStore::new();
        let connection = create_connection(
            &store,
            input("Sales", "https://tableau.example.com", "enc:123"),
        )
        .await
        .unwrap();

        assert_eq!(connection.status, ConnectionStatus::Inactive);
        assert!(connection.last_sync_at.is_none());
        assert_eq!(connection.created_at, connection.updated_at);
    }

    #[tokio::test]
    async fn test_create_connection_validation_lists_every_problem() {
        let store = MemoryStore::new();
        let err = create_connection(&store, input(" ", "not-a-valid-url", ""))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(message.contains("name must not be empty"));
        assert!(message.contains("'not-a-valid-url' is not a valid URL"));
        assert!(message.contains("credentials must not be empty"));
        assert!(get_connections(&store, &ConnectionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_connections_filters() {
        let store = MemoryStore::new();
        for (name, tool) in [
            ("a", BiTool::Tableau),
            ("b", BiTool::PowerBi),
            ("c", BiTool::Tableau),
        ] {
            let mut new = input(name, "https://bi.example.com", "x");
            new.bi_tool = tool;
            create_connection(&store, new).await.unwrap();
        }
        update_connection(
            &store,
            3,
            UpdateConnection {
                status: Some(ConnectionStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let all = get_connections(&store, &ConnectionFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let tableau_active = get_connections(
            &store,
            &ConnectionFilter {
                bi_tool: Some(BiTool::Tableau),
                status: Some(ConnectionStatus::Active),
            },
        )
        .await
        .unwrap();
        assert_eq!(tableau_active.len(), 1);
        assert_eq!(tableau_active[0].name, "c");

        let looker = get_connections(
            &store,
            &ConnectionFilter {
                bi_tool: Some(BiTool::Looker),
                status: None,
            },
        )
        .await
        .unwrap();
        assert!(looker.is_empty());
    }

    #[tokio::test]
    async fn test_update_connection_merges_fields() {
        let store = MemoryStore::new();
        let created = create_connection(
            &store,
            input("Old", "https://tableau.example.com", "enc:1"),
        )
        .await
        .unwrap();

        let updated = update_connection(
            &store,
            created.id,
            UpdateConnection {
                name: Some("New".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "New");
        assert_eq!(updated.connection_url, created.connection_url);
        assert_eq!(updated.credentials, created.credentials);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_unknown_connection() {
        let store = MemoryStore::new();
        let err = update_connection(&store, 404, UpdateConnection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { id: 404, .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_url() {
        let store = MemoryStore::new();
        let created = create_connection(&store, input("a", "https://x.example.com", "c"))
            .await
            .unwrap();
        let err = update_connection(
            &store,
            created.id,
            UpdateConnection {
                connection_url: Some("nope".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_connection_success_activates() {
        let store = MemoryStore::new();
        let adapter = SimulatedBiAdapter::new();
        let created = create_connection(
            &store,
            input("Test Tableau Connection", "https://tableau.example.com", "enc"),
        )
        .await
        .unwrap();

        let result = test_connection(&store, &adapter, created.id).await;

        assert!(result.success);
        assert!(result.message.contains("Successfully connected to tableau"));
        assert!(result.message.contains("https://tableau.example.com"));
        let connection = store.get_connection(created.id).await.unwrap().unwrap();
        assert_eq!(connection.status, ConnectionStatus::Active);
        assert!(connection.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_connection_not_found() {
        let store = MemoryStore::new();
        let result = test_connection(&store, &SimulatedBiAdapter::new(), 999).await;
        assert_eq!(result, ConnectionTestResult::failed("Connection not found"));
    }

    #[tokio::test]
    async fn test_connection_in_error_state_is_left_alone() {
        let store = MemoryStore::new();
        let created = stored(&store, "Error Connection", "https://p.example.com", "c").await;
        store
            .update_connection(
                created.id,
                ConnectionChanges::status(ConnectionStatus::Error),
                Utc::now(),
            )
            .await
            .unwrap();
        let before = store.get_connection(created.id).await.unwrap().unwrap();

        // the adapter must not be consulted
        let adapter = MockAdapter::new();
        let result = test_connection(&store, &adapter, created.id).await;

        assert_eq!(
            result,
            ConnectionTestResult::failed("Connection is in error state")
        );
        let after = store.get_connection(created.id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_connection_check_order() {
        let cases = [
            ("Invalid URL Connection", "not-a-valid-url", "creds", "Invalid connection URL"),
            ("No Credentials", "https://t.example.com", "", "Missing or invalid credentials"),
            ("Invalid Auth Connection", "https://t.example.com", "c", "Authentication failed"),
            ("Network Failure", "https://t.example.com", "c", "Network connection failed"),
            ("Timeout Connection", "https://t.example.com", "c", "Connection timeout"),
        ];

        for (name, url, credentials, expected) in cases {
            let store = MemoryStore::new();
            let created = stored(&store, name, url, credentials).await;

            let result = test_connection(&store, &SimulatedBiAdapter::new(), created.id).await;

            assert_eq!(result, ConnectionTestResult::failed(expected), "{}", name);
            let connection = store.get_connection(created.id).await.unwrap().unwrap();
            assert_eq!(connection.status, ConnectionStatus::Error, "{}", name);
            assert!(connection.last_sync_at.is_none());
        }
    }

    #[tokio::test]
    async fn test_connection_fails_closed_on_adapter_error() {
        let store = MemoryStore::new();
        let created = stored(&store, "Flaky", "https://t.example.com", "c").await;

        let mut adapter = MockAdapter::new();
        adapter
            .expect_probe()
            .returning(|_| Err(CoreError::Adapter("socket closed".to_string())));

        let result = test_connection(&store, &adapter, created.id).await;

        assert!(!result.success);
        assert!(result.message.contains("socket closed"));
        let connection = store.get_connection(created.id).await.unwrap().unwrap();
        assert_eq!(connection.status, ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_connection_swallows_store_failures() {
        let mut store = MockStore::new();
        store
            .expect_get_connection()
            .returning(|_| Err(CoreError::Internal("pool timed out".to_string())));
        store
            .expect_update_connection()
            .withf(|id, changes, _| {
                *id == 5 && changes.status == Some(ConnectionStatus::Error)
            })
            .times(1)
            .returning(|_, _, _| Err(CoreError::Internal("pool timed out".to_string())));

        let result = test_connection(&store, &SimulatedBiAdapter::new(), 5).await;

        assert!(!result.success);
        assert!(result.message.starts_with("Connection test failed"));
    }

    #[tokio::test]
    async fn test_sync_requires_active_connection() {
        let store = MemoryStore::new();
        let created = stored(&store, "Sales", "https://t.example.com", "c").await;

        let err = sync_assets(&store, &SimulatedBiAdapter::new(), created.id)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidState(_)));
        let message = err.to_string();
        assert!(message.contains("not active"));
        assert!(message.contains("inactive"));
    }

    #[tokio::test]
    async fn test_sync_unknown_connection() {
        let store = MemoryStore::new();
        let err = sync_assets(&store, &SimulatedBiAdapter::new(), 12)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { id: 12, .. }));
    }

    #[tokio::test]
    async fn test_sync_inserts_assets_and_stamps_connection() {
        let store = MemoryStore::new();
        let adapter = SimulatedBiAdapter::new();
        let created = create_connection(
            &store,
            input("Sales", "https://tableau.example.com", "enc"),
        )
        .await
        .unwrap();
        assert!(test_connection(&store, &adapter, created.id).await.success);

        let first = sync_assets(&store, &adapter, created.id).await.unwrap();
        let second = sync_assets(&store, &adapter, created.id).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|a| a.connection_id == created.id));
        for a in &first {
            assert!(second.iter().all(|b| b.external_id != a.external_id));
        }

        let connection = store.get_connection(created.id).await.unwrap().unwrap();
        assert_eq!(connection.last_sync_at, Some(second[0].created_at));

        let all = store.list_assets(&AssetFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);
    }
}
