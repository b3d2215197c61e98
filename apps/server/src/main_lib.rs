use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing::{info, warn};

use crm_replica_client::{CrmApiClient, CrmClientConfig};
use crm_replica_core::sync::{CrmRemoteTrait, SyncConfig, SyncOrchestrator, SyncRunRepositoryTrait};
use crm_replica_storage_sqlite::db::{self, spawn_writer};
use crm_replica_storage_sqlite::{RecordRepository, SyncMetadataRepository, SyncRunRepository};

use crate::api;
use crate::config::ServerConfig;

pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub runs: Arc<dyn SyncRunRepositoryTrait>,
}

/// Opens the replica database and wires the engine to the live CRM client.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let client = CrmApiClient::new(
        CrmClientConfig::new(config.crm_access_token.clone())
            .with_base_url(config.crm_api_url.clone())
            .with_timeout(config.http_timeout),
    )
    .context("Failed to build CRM client")?;
    build_state_with_remote(&config.db_path, Arc::new(client), config.sync.clone()).await
}

pub async fn build_state_with_remote(
    db_path: &str,
    remote: Arc<dyn CrmRemoteTrait>,
    sync_config: SyncConfig,
) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(db_path).context("Failed to prepare database path")?;
    db::run_migrations(&db_path).context("Failed to run migrations")?;
    let pool = db::create_pool(&db_path).context("Failed to open connection pool")?;
    let writer = spawn_writer(pool.as_ref().clone());

    let records = Arc::new(RecordRepository::new(pool.clone(), writer.clone()));
    let metadata = Arc::new(SyncMetadataRepository::new(pool.clone(), writer.clone()));
    let runs: Arc<dyn SyncRunRepositoryTrait> = Arc::new(SyncRunRepository::new(pool, writer));

    // Nothing runs yet in this process, so any `running` row is left over from a crash.
    match runs.cancel_in_flight().await {
        Ok(0) => {}
        Ok(n) => warn!("Cancelled {} sync runs left running by a previous process", n),
        Err(e) => warn!("Failed to repair in-flight sync state: {}", e),
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        remote,
        records,
        metadata,
        Some(runs.clone()),
        sync_config,
    ));
    info!("Replica database ready at {}", db_path);

    Ok(Arc::new(AppState { orchestrator, runs }))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    api::router(state)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use crm_replica_core::entities::{EntityType, RemotePage, RemoteRecord};
    use crm_replica_core::Result;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Single-page remote: 3 contacts, 2 companies, 1 deal linked to company "c-1".
    pub struct StaticCrm;

    fn records(prefix: &str, count: usize) -> Vec<RemoteRecord> {
        (1..=count)
            .map(|i| RemoteRecord {
                id: format!("{}-{}", prefix, i),
                properties: serde_json::Map::new(),
                created_at: None,
                updated_at: Some(Utc::now()),
            })
            .collect()
    }

    #[async_trait]
    impl CrmRemoteTrait for StaticCrm {
        async fn list_page(
            &self,
            entity: EntityType,
            _page_size: usize,
            _after: Option<String>,
        ) -> Result<RemotePage> {
            let results = match entity {
                EntityType::Contacts => records("p", 3),
                EntityType::Companies => records("c", 2),
                EntityType::Deals => records("d", 1),
            };
            Ok(RemotePage {
                results,
                next_cursor: None,
            })
        }

        async fn search_modified_since(
            &self,
            _entity: EntityType,
            _since: DateTime<Utc>,
            _page_size: usize,
            _after: Option<String>,
        ) -> Result<RemotePage> {
            Ok(RemotePage::default())
        }

        async fn read_associations(
            &self,
            _from: EntityType,
            to: EntityType,
            ids: &[String],
        ) -> Result<HashMap<String, Vec<String>>> {
            Ok(match to {
                EntityType::Companies => ids
                    .iter()
                    .map(|id| (id.clone(), vec!["c-1".to_string()]))
                    .collect(),
                _ => HashMap::new(),
            })
        }
    }

    pub struct Harness {
        pub _dir: TempDir,
        pub state: Arc<AppState>,
    }

    pub async fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("replica.db");
        let state = build_state_with_remote(
            path.to_str().unwrap(),
            Arc::new(StaticCrm),
            SyncConfig::default(),
        )
        .await
        .expect("build state");
        Harness { _dir: dir, state }
    }

    /// Polls `check` until it holds, failing the test after five seconds.
    pub async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..250 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }
}
