//! End-to-end sync runs against a real SQLite replica and a scripted remote.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use crm_replica_core::entities::{EntityType, RecordFields, RecordSyncStatus, RemotePage, RemoteRecord};
use crm_replica_core::sync::{
    CrmRemoteTrait, RecordRepositoryTrait, SyncConfig, SyncMetadataRepositoryTrait, SyncOrchestrator,
    SyncRunRepositoryTrait, SyncRunStatus,
};
use crm_replica_core::{Error, Result};
use crm_replica_storage_sqlite::db::{create_pool, init, run_migrations, spawn_writer};
use crm_replica_storage_sqlite::{RecordRepository, SyncMetadataRepository, SyncRunRepository};

/// Serves fixed pages per entity type; `fail_at` makes one page index answer 503.
#[derive(Default)]
struct ScriptedCrm {
    pages: HashMap<EntityType, Vec<Vec<RemoteRecord>>>,
    links: HashMap<(EntityType, EntityType), HashMap<String, Vec<String>>>,
    fail_at: Option<(EntityType, usize)>,
}

#[async_trait]
impl CrmRemoteTrait for ScriptedCrm {
    async fn list_page(
        &self,
        entity: EntityType,
        _page_size: usize,
        after: Option<String>,
    ) -> Result<RemotePage> {
        let index = after.and_then(|a| a.parse::<usize>().ok()).unwrap_or(0);
        if self.fail_at == Some((entity, index)) {
            return Err(Error::remote(Some(503), "service unavailable"));
        }
        let pages = self.pages.get(&entity).cloned().unwrap_or_default();
        Ok(RemotePage {
            results: pages.get(index).cloned().unwrap_or_default(),
            next_cursor: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
        })
    }

    async fn search_modified_since(
        &self,
        entity: EntityType,
        since: DateTime<Utc>,
        _page_size: usize,
        _after: Option<String>,
    ) -> Result<RemotePage> {
        let results = self
            .pages
            .get(&entity)
            .map(|pages| {
                pages
                    .iter()
                    .flatten()
                    .filter(|r| r.updated_at.is_some_and(|u| u >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(RemotePage {
            results,
            next_cursor: None,
        })
    }

    async fn read_associations(
        &self,
        from: EntityType,
        to: EntityType,
        _ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.links.get(&(from, to)).cloned().unwrap_or_default())
    }
}

struct Replica {
    _dir: TempDir,
    records: Arc<RecordRepository>,
    metadata: Arc<SyncMetadataRepository>,
    runs: Arc<SyncRunRepository>,
    orchestrator: Arc<SyncOrchestrator>,
}

fn replica(crm: ScriptedCrm) -> Replica {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("replica.db");
    let db_path = init(path.to_str().unwrap()).expect("init db");
    run_migrations(&db_path).expect("migrate db");
    let pool = create_pool(&db_path).expect("create pool");
    let writer = spawn_writer(pool.as_ref().clone());

    let records = Arc::new(RecordRepository::new(pool.clone(), writer.clone()));
    let metadata = Arc::new(SyncMetadataRepository::new(pool.clone(), writer.clone()));
    let runs = Arc::new(SyncRunRepository::new(pool, writer));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(crm),
        records.clone(),
        metadata.clone(),
        Some(runs.clone() as Arc<dyn SyncRunRepositoryTrait>),
        SyncConfig::default(),
    ));
    Replica {
        _dir: dir,
        records,
        metadata,
        runs,
        orchestrator,
    }
}

fn modified_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn paged(records: Vec<RemoteRecord>, page_size: usize) -> Vec<Vec<RemoteRecord>> {
    records.chunks(page_size).map(|c| c.to_vec()).collect()
}

fn contacts(count: usize) -> Vec<RemoteRecord> {
    (1..=count)
        .map(|i| RemoteRecord {
            id: i.to_string(),
            properties: json!({
                "email": format!("contact{}@example.com", i),
                "lastname": "Lovelace",
                "hs_analytics_source": "DIRECT_TRAFFIC",
            })
            .as_object()
            .cloned()
            .unwrap(),
            created_at: Some(modified_at()),
            updated_at: Some(modified_at()),
        })
        .collect()
}

#[tokio::test]
async fn full_then_incremental_over_sqlite() {
    let mut crm = ScriptedCrm::default();
    crm.pages
        .insert(EntityType::Contacts, paged(contacts(250), 100));
    let replica = replica(crm);

    let full = replica
        .orchestrator
        .sync_entity(EntityType::Contacts, None)
        .await;
    assert!(full.success, "{:?}", full.error);
    assert_eq!((full.inserted, full.modified, full.errors), (250, 0, 0));
    assert_eq!(replica.records.count(EntityType::Contacts).unwrap(), 250);

    let status = replica.orchestrator.get_status().unwrap();
    assert!(!status[&EntityType::Contacts].needs_sync);
    assert!(!status[&EntityType::Contacts].sync_in_progress);
    assert!(status[&EntityType::Deals].needs_sync);

    let incremental = replica
        .orchestrator
        .syncer(EntityType::Contacts)
        .incremental_sync(24)
        .await;
    assert!(incremental.success);
    assert_eq!((incremental.inserted, incremental.modified), (0, 0));
    // Watermark is the newest local sync time, which is later than every remote change.
    assert!(incremental.watermark.unwrap() > modified_at());

    let stored = replica
        .records
        .get_record(EntityType::Contacts, "42")
        .unwrap()
        .unwrap();
    assert_eq!(stored.sync_status, RecordSyncStatus::Synced);
    assert_eq!(stored.properties["hs_analytics_source"], "DIRECT_TRAFFIC");
}

#[tokio::test]
async fn second_full_sync_inserts_nothing() {
    let mut crm = ScriptedCrm::default();
    crm.pages
        .insert(EntityType::Companies, paged(contacts(120), 100));
    let replica = replica(crm);

    replica
        .orchestrator
        .sync_entity(EntityType::Companies, None)
        .await;
    let second = replica
        .orchestrator
        .sync_entity(EntityType::Companies, None)
        .await;

    assert!(second.success);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.modified, 120);
    assert_eq!(replica.records.count(EntityType::Companies).unwrap(), 120);
}

#[tokio::test]
async fn remote_failure_keeps_earlier_pages_and_records_error() {
    let mut crm = ScriptedCrm::default();
    crm.pages
        .insert(EntityType::Contacts, paged(contacts(500), 100));
    crm.fail_at = Some((EntityType::Contacts, 2));
    let replica = replica(crm);

    let result = replica
        .orchestrator
        .sync_entity(EntityType::Contacts, None)
        .await;

    assert!(!result.success);
    assert_eq!(replica.records.count(EntityType::Contacts).unwrap(), 200);

    let meta = replica
        .metadata
        .get_metadata(EntityType::Contacts)
        .unwrap()
        .unwrap();
    assert!(!meta.sync_in_progress);
    assert!(meta.last_full_sync_at.is_none());
    assert!(meta.last_sync_error.unwrap().contains("503"));

    let runs = replica.runs.list_recent_runs(5).unwrap();
    assert_eq!(runs[0].status, SyncRunStatus::Failed);
    assert_eq!(runs[0].inserted, 200);
}

#[tokio::test]
async fn deals_are_stored_with_resolved_associations() {
    let mut crm = ScriptedCrm::default();
    crm.pages.insert(
        EntityType::Deals,
        vec![vec![RemoteRecord {
            id: "9001".to_string(),
            properties: json!({ "dealname": "Expansion", "dealstage": "closedlost", "amount": "5000" })
                .as_object()
                .cloned()
                .unwrap(),
            created_at: None,
            updated_at: Some(modified_at()),
        }]],
    );
    crm.links.insert(
        (EntityType::Deals, EntityType::Companies),
        HashMap::from([("9001".to_string(), vec!["77".to_string()])]),
    );
    let replica = replica(crm);

    let result = replica.orchestrator.sync_entity(EntityType::Deals, None).await;
    assert!(result.success);

    let stored = replica
        .records
        .get_record(EntityType::Deals, "9001")
        .unwrap()
        .unwrap();
    let RecordFields::Deal(fields) = stored.fields else {
        panic!("expected deal fields");
    };
    assert_eq!(fields.company_ids, vec!["77".to_string()]);
    assert!(fields.contact_ids.is_empty());
    assert!(fields.is_closed && fields.is_lost && !fields.is_won);
    assert_eq!(fields.amount, Some(5000.0));
}

#[tokio::test]
async fn cancel_in_flight_after_a_crash() {
    let replica = replica(ScriptedCrm::default());
    replica
        .metadata
        .mark_in_progress(EntityType::Companies)
        .await
        .unwrap();
    replica
        .runs
        .insert_run(crm_replica_core::sync::SyncRun {
            id: "orphaned".to_string(),
            entity_type: EntityType::Companies,
            mode: crm_replica_core::sync::SyncMode::Full,
            status: SyncRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            fetched: 10,
            inserted: 10,
            modified: 0,
            errors: 0,
            error_message: None,
        })
        .await
        .unwrap();

    assert_eq!(replica.runs.cancel_in_flight().await.unwrap(), 1);

    let status = replica.orchestrator.get_status().unwrap();
    assert!(!status[&EntityType::Companies].sync_in_progress);
    let runs = replica.runs.list_recent_runs(1).unwrap();
    assert_eq!(runs[0].status, SyncRunStatus::Cancelled);
}
