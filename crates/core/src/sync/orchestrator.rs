//! Public entry point: fan-out across entity types, staleness policy and background triggers.

use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::entities::EntityType;
use crate::errors::Result;

use super::background::spawn_background;
use super::config::{age_window, SyncConfig};
use super::entity_syncer::EntitySyncer;
use super::metadata_store::SyncMetadataStore;
use super::record_store::LocalRecordStore;
use super::sync_model::{EnsureSyncResult, EntitySyncResult, SyncAllResult, SyncStatusReport};
use super::traits::{
    CrmRemoteTrait, RecordRepositoryTrait, SyncMetadataRepositoryTrait, SyncRunRepositoryTrait,
};

fn log_failures(label: &str, results: &SyncAllResult) {
    for result in results.iter().filter(|r| !r.success) {
        warn!(
            "[CrmSync] {} {} failed: {}",
            label,
            result.entity_type,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

pub struct SyncOrchestrator {
    contacts: Arc<EntitySyncer>,
    companies: Arc<EntitySyncer>,
    deals: Arc<EntitySyncer>,
    metadata: SyncMetadataStore,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn CrmRemoteTrait>,
        record_repository: Arc<dyn RecordRepositoryTrait>,
        metadata_repository: Arc<dyn SyncMetadataRepositoryTrait>,
        run_repository: Option<Arc<dyn SyncRunRepositoryTrait>>,
        config: SyncConfig,
    ) -> Self {
        let records = LocalRecordStore::new(Arc::clone(&record_repository));
        let metadata = SyncMetadataStore::new(metadata_repository, record_repository);
        let syncer = |entity: EntityType| {
            Arc::new(EntitySyncer::new(
                entity,
                config.clone(),
                Arc::clone(&remote),
                records.clone(),
                metadata.clone(),
                run_repository.clone(),
            ))
        };

        Self {
            contacts: syncer(EntityType::Contacts),
            companies: syncer(EntityType::Companies),
            deals: syncer(EntityType::Deals),
            metadata,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn syncer(&self, entity: EntityType) -> Arc<EntitySyncer> {
        match entity {
            EntityType::Contacts => Arc::clone(&self.contacts),
            EntityType::Companies => Arc::clone(&self.companies),
            EntityType::Deals => Arc::clone(&self.deals),
        }
    }

    /// Full sync of all entity types concurrently; joins every result. Never fails.
    pub async fn sync_all(&self, limit: Option<usize>) -> SyncAllResult {
        let (contacts, companies, deals) = tokio::join!(
            self.contacts.full_sync(limit),
            self.companies.full_sync(limit),
            self.deals.full_sync(limit),
        );
        SyncAllResult {
            contacts,
            companies,
            deals,
        }
    }

    /// Incremental sync of all entity types concurrently; joins every result. Never fails.
    pub async fn sync_all_incremental(&self, max_age_hours: i64) -> SyncAllResult {
        let (contacts, companies, deals) = tokio::join!(
            self.contacts.incremental_sync(max_age_hours),
            self.companies.incremental_sync(max_age_hours),
            self.deals.incremental_sync(max_age_hours),
        );
        SyncAllResult {
            contacts,
            companies,
            deals,
        }
    }

    pub async fn sync_entity(&self, entity: EntityType, limit: Option<usize>) -> EntitySyncResult {
        self.syncer(entity).full_sync(limit).await
    }

    /// Starts `sync_all_incremental` in the background and returns at once.
    /// Outcomes are only logged.
    pub fn trigger_incremental_sync(self: &Arc<Self>, max_age_hours: i64) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        spawn_background("incremental-sync".to_string(), async move {
            let results = orchestrator.sync_all_incremental(max_age_hours).await;
            log_failures("Background incremental sync", &results);
        })
    }

    /// Starts background full syncs for the stale entity types, without waiting.
    ///
    /// Types whose syncer is already running are left out. An out-of-range `max_age_hours`
    /// triggers nothing.
    pub fn ensure_data_synced(self: &Arc<Self>, max_age_hours: i64) -> EnsureSyncResult {
        let max_age = match age_window(max_age_hours) {
            Ok(max_age) => max_age,
            Err(err) => {
                warn!("[CrmSync] Ensure skipped: {}", err);
                return EnsureSyncResult::default();
            }
        };

        let mut stale = Vec::new();
        for entity in EntityType::ALL {
            let is_stale = match self.metadata.is_stale(entity, max_age) {
                Ok(stale) => stale,
                Err(err) => {
                    warn!(
                        "[CrmSync] Could not read {} sync metadata, treating as stale: {}",
                        entity, err
                    );
                    true
                }
            };
            if !is_stale {
                continue;
            }
            if self.syncer(entity).is_running() {
                info!(
                    "[CrmSync] {} is stale but already syncing, not triggering another run",
                    entity
                );
                continue;
            }
            stale.push(entity);
        }

        for entity in &stale {
            let syncer = self.syncer(*entity);
            spawn_background(format!("full-sync-{}", entity), async move {
                let result = syncer.full_sync(None).await;
                if !result.success {
                    warn!(
                        "[CrmSync] Background full sync of {} failed: {}",
                        result.entity_type,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            });
        }

        if !stale.is_empty() {
            info!("[CrmSync] Triggered background full sync for {:?}", stale);
        }

        EnsureSyncResult {
            triggered: !stale.is_empty(),
            entities: stale,
        }
    }

    pub fn get_status(&self) -> Result<SyncStatusReport> {
        self.metadata
            .get_status(age_window(self.config.max_age_hours)?)
    }
}
