//! Seams between the sync engine and its collaborators (remote CRM, local store).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::entities::{EntityType, LocalRecord, RemotePage};
use crate::errors::Result;

use super::sync_model::{SyncCompletion, SyncMetadata, SyncRun, UpsertCounts};

/// Remote CRM API consumed by the engine.
#[async_trait]
pub trait CrmRemoteTrait: Send + Sync {
    /// Cursor-paginated scan of an entire collection.
    async fn list_page(
        &self,
        entity: EntityType,
        page_size: usize,
        after: Option<String>,
    ) -> Result<RemotePage>;

    /// Records whose last-modified timestamp is `>= since`, same pagination shape.
    async fn search_modified_since(
        &self,
        entity: EntityType,
        since: DateTime<Utc>,
        page_size: usize,
        after: Option<String>,
    ) -> Result<RemotePage>;

    /// One batch association read: parent ID → related IDs for a single relationship type.
    async fn read_associations(
        &self,
        from: EntityType,
        to: EntityType,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>>;
}

/// Per-entity-type collections of replica records.
#[async_trait]
pub trait RecordRepositoryTrait: Send + Sync {
    /// Upserts one batch keyed by remote ID in a single transaction. Records that cannot be
    /// stored are left out and counted in `UpsertCounts::errors`; a write failure fails the
    /// whole batch. Never lowers a stored `last_synced_at`.
    async fn upsert_batch(
        &self,
        entity: EntityType,
        records: Vec<LocalRecord>,
    ) -> Result<UpsertCounts>;

    /// Demotes `synced` records with `last_synced_at < older_than` to `pending`.
    async fn sweep_stale(&self, entity: EntityType, older_than: DateTime<Utc>) -> Result<usize>;

    /// Most recent `last_synced_at` in the collection, if any record exists.
    fn latest_synced_at(&self, entity: EntityType) -> Result<Option<DateTime<Utc>>>;

    fn count(&self, entity: EntityType) -> Result<i64>;

    fn get_record(&self, entity: EntityType, remote_id: &str) -> Result<Option<LocalRecord>>;
}

/// Upsert-by-entity-type bookkeeping writes.
#[async_trait]
pub trait SyncMetadataRepositoryTrait: Send + Sync {
    fn get_metadata(&self, entity: EntityType) -> Result<Option<SyncMetadata>>;

    fn list_metadata(&self) -> Result<Vec<SyncMetadata>>;

    async fn mark_in_progress(&self, entity: EntityType) -> Result<()>;

    /// Clears the in-progress flag and last error; `last_full_sync_at` only moves on full syncs.
    async fn mark_complete(&self, entity: EntityType, completion: SyncCompletion) -> Result<()>;

    async fn mark_failed(&self, entity: EntityType, error_message: String) -> Result<()>;

    /// Resets the advisory in-progress flag without touching anything else.
    async fn clear_in_progress(&self, entity: Option<EntityType>) -> Result<usize>;
}

/// Persisted history of sync runs.
#[async_trait]
pub trait SyncRunRepositoryTrait: Send + Sync {
    async fn insert_run(&self, run: SyncRun) -> Result<()>;

    async fn update_run(&self, run: SyncRun) -> Result<()>;

    fn list_recent_runs(&self, limit: i64) -> Result<Vec<SyncRun>>;

    /// Marks every `running` run as cancelled and clears `sync_in_progress` on all metadata.
    /// Returns the number of runs cancelled.
    async fn cancel_in_flight(&self) -> Result<usize>;
}
