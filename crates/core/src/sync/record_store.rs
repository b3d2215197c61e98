//! Batched writes into the local replica.

use chrono::{Duration, Utc};
use log::{debug, warn};
use std::sync::Arc;

use crate::entities::{EntityType, LocalRecord};
use crate::errors::{Error, Result};

use super::sync_model::BulkWriteSummary;
use super::traits::RecordRepositoryTrait;

#[derive(Clone)]
pub struct LocalRecordStore {
    repository: Arc<dyn RecordRepositoryTrait>,
}

impl LocalRecordStore {
    pub fn new(repository: Arc<dyn RecordRepositoryTrait>) -> Self {
        Self { repository }
    }

    /// Writes `records` in groups of `batch_size`, one bulk write per group.
    ///
    /// A failed group counts every one of its records as errored and the next group still runs.
    pub async fn bulk_upsert(
        &self,
        entity: EntityType,
        records: Vec<LocalRecord>,
        batch_size: usize,
    ) -> BulkWriteSummary {
        let mut summary = BulkWriteSummary::default();
        if records.is_empty() {
            return summary;
        }

        let batch_size = batch_size.max(1);
        let mut remaining = records;
        while !remaining.is_empty() {
            let rest = remaining.split_off(batch_size.min(remaining.len()));
            let batch = std::mem::replace(&mut remaining, rest);
            let batch_len = batch.len();

            match self.repository.upsert_batch(entity, batch).await {
                Ok(counts) => {
                    debug!(
                        "[CrmSync] {} batch written: {} inserted, {} modified, {} skipped",
                        entity, counts.inserted, counts.modified, counts.errors
                    );
                    summary.inserted += counts.inserted;
                    summary.modified += counts.modified;
                    summary.errors += counts.errors;
                }
                Err(err) => {
                    warn!(
                        "[CrmSync] {} batch of {} records failed: {}",
                        entity, batch_len, err
                    );
                    summary.errors += batch_len;
                    summary.failed_batches += 1;
                    summary.last_error = Some(err.to_string());
                }
            }
        }
        summary
    }

    /// Demotes records not confirmed within `max_age` from `synced` to `pending`.
    pub async fn sweep_stale(&self, entity: EntityType, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .ok_or_else(|| Error::config("staleness window is out of range"))?;
        let swept = self.repository.sweep_stale(entity, cutoff).await?;
        if swept > 0 {
            debug!("[CrmSync] {} sweep demoted {} records", entity, swept);
        }
        Ok(swept)
    }

    pub fn latest_synced_at(&self, entity: EntityType) -> Result<Option<chrono::DateTime<Utc>>> {
        self.repository.latest_synced_at(entity)
    }

    pub fn count(&self, entity: EntityType) -> Result<i64> {
        self.repository.count(entity)
    }
}
