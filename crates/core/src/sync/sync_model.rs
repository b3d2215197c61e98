//! Sync bookkeeping models: metadata, run history and per-run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::entities::EntityType;
use crate::errors::Error;

/// Persisted bookkeeping record, one per entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub entity_type: EntityType,
    /// `None` means the entity type was never fully synced.
    pub last_full_sync_at: Option<DateTime<Utc>>,
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    /// Advisory only; exclusion is enforced by the in-memory flag.
    pub sync_in_progress: bool,
    pub total_records: i64,
    pub last_sync_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Completion data written by `mark_complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCompletion {
    pub is_full_sync: bool,
    pub total_records: i64,
    pub completed_at: DateTime<Utc>,
}

/// Counts returned by one bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertCounts {
    pub inserted: usize,
    pub modified: usize,
    /// Records left out of the write because they could not be stored.
    pub errors: usize,
}

/// Running totals across all batches of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteSummary {
    pub inserted: usize,
    pub modified: usize,
    pub errors: usize,
    pub failed_batches: usize,
    pub last_error: Option<String>,
}

impl BulkWriteSummary {
    pub fn absorb(&mut self, other: BulkWriteSummary) {
        self.inserted += other.inserted;
        self.modified += other.modified;
        self.errors += other.errors;
        self.failed_batches += other.failed_batches;
        if other.last_error.is_some() {
            self.last_error = other.last_error;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(Error::Internal(format!("Unknown sync mode '{}'", other))),
        }
    }
}

/// Entity sync state machine: `Idle → Paging → Upserting → Sweeping → Done|Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Paging,
    Upserting,
    Sweeping,
    Done,
    Failed,
    /// Another run for the same entity type held the lock.
    Skipped,
}

/// Outcome of one entity syncer call. Never an `Err`: failures are reported here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySyncResult {
    pub entity_type: EntityType,
    pub mode: SyncMode,
    pub success: bool,
    pub skipped: bool,
    pub phase: SyncPhase,
    pub fetched: usize,
    pub inserted: usize,
    pub modified: usize,
    pub errors: usize,
    pub swept: usize,
    pub watermark: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl EntitySyncResult {
    pub fn new(entity_type: EntityType, mode: SyncMode) -> Self {
        Self {
            entity_type,
            mode,
            success: false,
            skipped: false,
            phase: SyncPhase::Idle,
            fetched: 0,
            inserted: 0,
            modified: 0,
            errors: 0,
            swept: 0,
            watermark: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Result for a call that found another run of the same entity type in flight.
    pub fn skipped(entity_type: EntityType, mode: SyncMode) -> Self {
        Self {
            success: true,
            skipped: true,
            phase: SyncPhase::Skipped,
            error: Some(format!("Sync already in progress for {}", entity_type)),
            ..Self::new(entity_type, mode)
        }
    }
}

/// Joined results of a sync across all entity types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllResult {
    pub contacts: EntitySyncResult,
    pub companies: EntitySyncResult,
    pub deals: EntitySyncResult,
}

impl SyncAllResult {
    pub fn all_succeeded(&self) -> bool {
        self.iter().all(|r| r.success)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySyncResult> {
        [&self.contacts, &self.companies, &self.deals].into_iter()
    }
}

/// Answer of `ensure_data_synced`: which stale entity types got a background full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureSyncResult {
    pub triggered: bool,
    pub entities: Vec<EntityType>,
}

/// Status view for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySyncStatus {
    pub last_full_sync: Option<DateTime<Utc>>,
    pub last_incremental_sync: Option<DateTime<Utc>>,
    pub total_records: i64,
    pub needs_sync: bool,
    pub sync_in_progress: bool,
    pub last_sync_error: Option<String>,
}

pub type SyncStatusReport = BTreeMap<EntityType, EntitySyncStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
            SyncRunStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncRunStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(SyncRunStatus::Running),
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            "cancelled" => Ok(SyncRunStatus::Cancelled),
            other => Err(Error::Internal(format!("Unknown run status '{}'", other))),
        }
    }
}

/// Persisted history entry for one entity sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub entity_type: EntityType,
    pub mode: SyncMode,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fetched: i64,
    pub inserted: i64,
    pub modified: i64,
    pub errors: i64,
    pub error_message: Option<String>,
}

impl SyncRun {
    /// Terminal fields derived from a finished syncer result.
    pub fn finish_from(&mut self, result: &EntitySyncResult, finished_at: DateTime<Utc>) {
        self.status = if result.success {
            SyncRunStatus::Completed
        } else {
            SyncRunStatus::Failed
        };
        self.finished_at = Some(finished_at);
        self.fetched = result.fetched as i64;
        self.inserted = result.inserted as i64;
        self.modified = result.modified as i64;
        self.errors = result.errors as i64;
        self.error_message = result.error.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_result_is_successful_and_side_effect_free() {
        let result = EntitySyncResult::skipped(EntityType::Deals, SyncMode::Full);
        assert!(result.success);
        assert!(result.skipped);
        assert_eq!(result.phase, SyncPhase::Skipped);
        assert_eq!(result.inserted + result.modified + result.errors, 0);
    }

    #[test]
    fn bulk_summary_absorbs_counts_and_keeps_latest_error() {
        let mut total = BulkWriteSummary {
            inserted: 2,
            ..Default::default()
        };
        total.absorb(BulkWriteSummary {
            inserted: 1,
            modified: 3,
            errors: 5,
            failed_batches: 1,
            last_error: Some("disk full".to_string()),
        });
        total.absorb(BulkWriteSummary::default());
        assert_eq!(total.inserted, 3);
        assert_eq!(total.modified, 3);
        assert_eq!(total.errors, 5);
        assert_eq!(total.last_error.as_deref(), Some("disk full"));
    }

    #[test]
    fn run_status_round_trips() {
        for status in [
            SyncRunStatus::Running,
            SyncRunStatus::Completed,
            SyncRunStatus::Failed,
            SyncRunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SyncRunStatus>().unwrap(), status);
        }
    }
}
