//! Full and incremental sync pipelines for one entity type.
//!
//! One generic syncer serves contacts, companies and deals; the differences between them
//! (promoted fields, last-modified property, association needs, batch size) come from
//! [`EntityType`] and the mapping module.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::entities::{to_local_record, EntityType, LocalRecord, RemotePage};
use crate::errors::Result;

use super::association_resolver::AssociationResolver;
use super::config::{age_cutoff, SyncConfig};
use super::lock::SyncFlag;
use super::metadata_store::SyncMetadataStore;
use super::record_store::LocalRecordStore;
use super::sync_model::{
    EntitySyncResult, SyncCompletion, SyncMode, SyncPhase, SyncRun, SyncRunStatus,
};
use super::traits::{CrmRemoteTrait, SyncRunRepositoryTrait};

/// What a single run asks of the remote API.
#[derive(Debug, Clone, Copy)]
enum FetchPlan {
    /// Unfiltered cursor scan, optionally capped at `limit` records.
    Full { limit: Option<usize> },
    /// Filtered search for records modified at or after the watermark.
    Since { watermark: DateTime<Utc> },
}

pub struct EntitySyncer {
    entity: EntityType,
    config: SyncConfig,
    remote: Arc<dyn CrmRemoteTrait>,
    associations: AssociationResolver,
    records: LocalRecordStore,
    metadata: SyncMetadataStore,
    runs: Option<Arc<dyn SyncRunRepositoryTrait>>,
    flag: SyncFlag,
}

impl EntitySyncer {
    pub fn new(
        entity: EntityType,
        config: SyncConfig,
        remote: Arc<dyn CrmRemoteTrait>,
        records: LocalRecordStore,
        metadata: SyncMetadataStore,
        runs: Option<Arc<dyn SyncRunRepositoryTrait>>,
    ) -> Self {
        Self {
            entity,
            config,
            associations: AssociationResolver::new(Arc::clone(&remote)),
            remote,
            records,
            metadata,
            runs,
            flag: SyncFlag::new(),
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Whether a run for this entity type currently holds the in-memory lock.
    pub fn is_running(&self) -> bool {
        self.flag.is_held()
    }

    /// Pages through the entire remote collection.
    ///
    /// With `limit`, processing stops after that many records (mid-page if needed) and the
    /// run does not count as a full sync for staleness purposes.
    pub async fn full_sync(&self, limit: Option<usize>) -> EntitySyncResult {
        self.run(SyncMode::Full, limit, self.config.max_age_hours)
            .await
    }

    /// Fetches records modified since the replica's own freshness watermark.
    pub async fn incremental_sync(&self, max_age_hours: i64) -> EntitySyncResult {
        self.run(SyncMode::Incremental, None, max_age_hours).await
    }

    /// Latest local `last_synced_at`, or `now - max_age_hours` when the replica is empty.
    ///
    /// An out-of-range `max_age_hours` is a configuration error even when records exist.
    pub fn incremental_watermark(&self, max_age_hours: i64) -> Result<DateTime<Utc>> {
        let fallback = age_cutoff(Utc::now(), max_age_hours)?;
        Ok(self
            .records
            .latest_synced_at(self.entity)?
            .unwrap_or(fallback))
    }

    async fn run(
        &self,
        mode: SyncMode,
        limit: Option<usize>,
        max_age_hours: i64,
    ) -> EntitySyncResult {
        let Some(_guard) = self.flag.try_acquire() else {
            info!(
                "[CrmSync] {} {} sync skipped: already in progress",
                self.entity,
                mode.as_str()
            );
            return EntitySyncResult::skipped(self.entity, mode);
        };

        let started = Instant::now();
        let mut result = EntitySyncResult::new(self.entity, mode);
        info!("[CrmSync] Starting {} {} sync", self.entity, mode.as_str());

        if let Err(err) = self.metadata.mark_in_progress(self.entity).await {
            warn!(
                "[CrmSync] Failed to mark {} sync in progress: {}",
                self.entity, err
            );
        }
        let run_record = self.start_run_record(mode).await;

        let outcome = match mode {
            SyncMode::Full => self.page_through(FetchPlan::Full { limit }, &mut result).await,
            SyncMode::Incremental => match self.incremental_watermark(max_age_hours) {
                Ok(watermark) => {
                    result.watermark = Some(watermark);
                    self.page_through(FetchPlan::Since { watermark }, &mut result)
                        .await
                }
                Err(err) => Err(err),
            },
        };

        let counts_as_full_sync = mode == SyncMode::Full && limit.is_none();
        self.finalize(outcome, counts_as_full_sync, &mut result).await;
        result.duration_ms = started.elapsed().as_millis() as i64;

        if let Some(run) = run_record {
            self.finish_run_record(run, &result).await;
        }

        info!(
            "[CrmSync] {} {} sync finished success={} fetched={} inserted={} modified={} errors={} swept={} in {}ms",
            self.entity,
            mode.as_str(),
            result.success,
            result.fetched,
            result.inserted,
            result.modified,
            result.errors,
            result.swept,
            result.duration_ms
        );
        result
    }

    fn enter_phase(&self, result: &mut EntitySyncResult, phase: SyncPhase) {
        if result.phase != phase {
            debug!(
                "[CrmSync] {} phase {:?} -> {:?}",
                self.entity, result.phase, phase
            );
            result.phase = phase;
        }
    }

    async fn fetch_page(&self, plan: FetchPlan, after: Option<String>) -> Result<RemotePage> {
        match plan {
            FetchPlan::Full { .. } => {
                self.remote
                    .list_page(self.entity, self.config.page_size, after)
                    .await
            }
            FetchPlan::Since { watermark } => {
                self.remote
                    .search_modified_since(self.entity, watermark, self.config.page_size, after)
                    .await
            }
        }
    }

    /// Sequential page loop: page N+1 is never requested before page N is buffered,
    /// and a full buffer is flushed before the next request.
    async fn page_through(&self, plan: FetchPlan, result: &mut EntitySyncResult) -> Result<()> {
        let batch_size = self.config.batch_size_for(self.entity);
        let limit = match plan {
            FetchPlan::Full { limit } => limit,
            FetchPlan::Since { .. } => None,
        };
        let mut buffer: Vec<LocalRecord> = Vec::with_capacity(batch_size);
        let mut cursor: Option<String> = None;

        loop {
            self.enter_phase(result, SyncPhase::Paging);
            let page = match self.fetch_page(plan, cursor.clone()).await {
                Ok(page) => page,
                Err(err) => {
                    // Records already fetched are still written; nothing is rolled back.
                    self.flush(&mut buffer, batch_size, result).await;
                    return Err(err);
                }
            };

            let mut records = page.results;
            if let Some(limit) = limit {
                records.truncate(limit.saturating_sub(result.fetched));
            }
            result.fetched += records.len();

            if !records.is_empty() {
                let associations = if self.entity.has_associations() {
                    let ids = records.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
                    Some(
                        self.associations
                            .resolve_associations(self.entity, &ids, self.entity.associations())
                            .await,
                    )
                } else {
                    None
                };

                let now = Utc::now();
                for record in records {
                    let related = associations.as_ref().and_then(|map| map.get(&record.id));
                    buffer.push(to_local_record(self.entity, record, related, now));
                }

                if buffer.len() >= batch_size {
                    self.flush(&mut buffer, batch_size, result).await;
                }
            }

            let limit_reached = limit.is_some_and(|limit| result.fetched >= limit);
            match page.next_cursor {
                Some(next) if !limit_reached => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        warn!(
                            "[CrmSync] {} remote repeated cursor '{}', stopping pagination",
                            self.entity, next
                        );
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        self.flush(&mut buffer, batch_size, result).await;
        Ok(())
    }

    async fn flush(
        &self,
        buffer: &mut Vec<LocalRecord>,
        batch_size: usize,
        result: &mut EntitySyncResult,
    ) {
        if buffer.is_empty() {
            return;
        }
        self.enter_phase(result, SyncPhase::Upserting);
        let records = std::mem::take(buffer);
        let summary = self
            .records
            .bulk_upsert(self.entity, records, batch_size)
            .await;
        result.inserted += summary.inserted;
        result.modified += summary.modified;
        result.errors += summary.errors;
        if let Some(message) = summary.last_error {
            result.error = Some(message);
        }
    }

    async fn finalize(
        &self,
        outcome: Result<()>,
        counts_as_full_sync: bool,
        result: &mut EntitySyncResult,
    ) {
        match outcome {
            Ok(()) => {
                if result.mode == SyncMode::Full {
                    self.enter_phase(result, SyncPhase::Sweeping);
                    let swept = match self.config.stale_after() {
                        Ok(window) => self.records.sweep_stale(self.entity, window).await,
                        Err(err) => Err(err),
                    };
                    match swept {
                        Ok(swept) => result.swept = swept,
                        Err(err) => {
                            warn!("[CrmSync] {} staleness sweep failed: {}", self.entity, err)
                        }
                    }
                }

                let total_records = match self.records.count(self.entity) {
                    Ok(count) => count,
                    Err(err) => {
                        warn!("[CrmSync] Failed to count {} records: {}", self.entity, err);
                        (result.inserted + result.modified) as i64
                    }
                };
                let completion = SyncCompletion {
                    is_full_sync: counts_as_full_sync,
                    total_records,
                    completed_at: Utc::now(),
                };
                if let Err(err) = self.metadata.mark_complete(self.entity, completion).await {
                    warn!(
                        "[CrmSync] Failed to record {} sync completion: {}",
                        self.entity, err
                    );
                    self.release_persisted_flag().await;
                }
                result.success = true;
                self.enter_phase(result, SyncPhase::Done);
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    "[CrmSync] {} {} sync failed after {} records: {}",
                    self.entity,
                    result.mode.as_str(),
                    result.fetched,
                    message
                );
                if let Err(meta_err) = self.metadata.mark_failed(self.entity, message.clone()).await
                {
                    warn!(
                        "[CrmSync] Failed to record {} sync failure: {}",
                        self.entity, meta_err
                    );
                    self.release_persisted_flag().await;
                }
                result.success = false;
                result.error = Some(message);
                self.enter_phase(result, SyncPhase::Failed);
            }
        }
    }

    async fn release_persisted_flag(&self) {
        if let Err(err) = self.metadata.clear_in_progress(self.entity).await {
            warn!(
                "[CrmSync] Failed to clear {} in-progress flag: {}",
                self.entity, err
            );
        }
    }

    async fn start_run_record(&self, mode: SyncMode) -> Option<SyncRun> {
        let runs = self.runs.as_ref()?;
        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            entity_type: self.entity,
            mode,
            status: SyncRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            fetched: 0,
            inserted: 0,
            modified: 0,
            errors: 0,
            error_message: None,
        };
        match runs.insert_run(run.clone()).await {
            Ok(()) => Some(run),
            Err(err) => {
                warn!("[CrmSync] Failed to record {} run start: {}", self.entity, err);
                None
            }
        }
    }

    async fn finish_run_record(&self, mut run: SyncRun, result: &EntitySyncResult) {
        let Some(runs) = self.runs.as_ref() else {
            return;
        };
        run.finish_from(result, Utc::now());
        if let Err(err) = runs.update_run(run).await {
            warn!("[CrmSync] Failed to record {} run outcome: {}", self.entity, err);
        }
    }
}
