//! Staleness decisions and status reporting over persisted sync metadata.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::EntityType;
use crate::errors::Result;

use super::sync_model::{
    EntitySyncStatus, SyncCompletion, SyncMetadata, SyncStatusReport,
};
use super::traits::{RecordRepositoryTrait, SyncMetadataRepositoryTrait};

/// True if the metadata shows no full sync, or the last one is older than `max_age`.
pub fn is_metadata_stale(
    metadata: Option<&SyncMetadata>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> bool {
    match metadata.and_then(|m| m.last_full_sync_at) {
        Some(last_full_sync) => now - last_full_sync > max_age,
        None => true,
    }
}

#[derive(Clone)]
pub struct SyncMetadataStore {
    metadata_repository: Arc<dyn SyncMetadataRepositoryTrait>,
    record_repository: Arc<dyn RecordRepositoryTrait>,
}

impl SyncMetadataStore {
    pub fn new(
        metadata_repository: Arc<dyn SyncMetadataRepositoryTrait>,
        record_repository: Arc<dyn RecordRepositoryTrait>,
    ) -> Self {
        Self {
            metadata_repository,
            record_repository,
        }
    }

    pub fn is_stale(&self, entity: EntityType, max_age: Duration) -> Result<bool> {
        let metadata = self.metadata_repository.get_metadata(entity)?;
        Ok(is_metadata_stale(metadata.as_ref(), max_age, Utc::now()))
    }

    pub async fn mark_in_progress(&self, entity: EntityType) -> Result<()> {
        self.metadata_repository.mark_in_progress(entity).await
    }

    pub async fn mark_complete(&self, entity: EntityType, completion: SyncCompletion) -> Result<()> {
        self.metadata_repository
            .mark_complete(entity, completion)
            .await
    }

    pub async fn mark_failed(&self, entity: EntityType, error_message: String) -> Result<()> {
        self.metadata_repository
            .mark_failed(entity, error_message)
            .await
    }

    pub async fn clear_in_progress(&self, entity: EntityType) -> Result<()> {
        self.metadata_repository
            .clear_in_progress(Some(entity))
            .await
            .map(|_| ())
    }

    /// Per entity type: metadata combined with a live record count.
    pub fn get_status(&self, max_age: Duration) -> Result<SyncStatusReport> {
        let now = Utc::now();
        let mut rows = self
            .metadata_repository
            .list_metadata()?
            .into_iter()
            .map(|m| (m.entity_type, m))
            .collect::<HashMap<_, _>>();
        let mut report = SyncStatusReport::new();
        for entity in EntityType::ALL {
            let metadata = rows.remove(&entity);
            let total_records = self.record_repository.count(entity)?;
            let needs_sync = is_metadata_stale(metadata.as_ref(), max_age, now);
            report.insert(
                entity,
                EntitySyncStatus {
                    last_full_sync: metadata.as_ref().and_then(|m| m.last_full_sync_at),
                    last_incremental_sync: metadata
                        .as_ref()
                        .and_then(|m| m.last_incremental_sync_at),
                    total_records,
                    needs_sync,
                    sync_in_progress: metadata.as_ref().map(|m| m.sync_in_progress).unwrap_or(false),
                    last_sync_error: metadata.and_then(|m| m.last_sync_error),
                },
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(last_full_sync_at: Option<DateTime<Utc>>) -> SyncMetadata {
        SyncMetadata {
            entity_type: EntityType::Contacts,
            last_full_sync_at,
            last_incremental_sync_at: None,
            sync_in_progress: false,
            total_records: 0,
            last_sync_error: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_metadata_is_stale() {
        assert!(is_metadata_stale(None, Duration::hours(24), Utc::now()));
    }

    #[test]
    fn never_fully_synced_is_stale() {
        let meta = metadata(None);
        assert!(is_metadata_stale(Some(&meta), Duration::hours(24), Utc::now()));
    }

    #[test]
    fn staleness_follows_max_age() {
        let now = Utc::now();
        let fresh = metadata(Some(now - Duration::hours(23)));
        let stale = metadata(Some(now - Duration::hours(25)));
        assert!(!is_metadata_stale(Some(&fresh), Duration::hours(24), now));
        assert!(is_metadata_stale(Some(&stale), Duration::hours(24), now));
    }
}
