//! Database model for per-entity-type sync bookkeeping.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crm_replica_core::sync::SyncMetadata;
use crm_replica_core::{Error, Result};

use crate::utils::{timestamp_from_db, timestamp_opt_from_db};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(entity_type))]
#[diesel(table_name = crate::schema::sync_metadata)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncMetadataDB {
    pub entity_type: String,
    pub last_full_sync_at: Option<String>,
    pub last_incremental_sync_at: Option<String>,
    pub sync_in_progress: bool,
    pub total_records: i64,
    pub last_sync_error: Option<String>,
    pub updated_at: String,
}

impl SyncMetadataDB {
    /// Row for an entity type seen for the first time.
    pub fn new(entity_type: &str, updated_at: String) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            last_full_sync_at: None,
            last_incremental_sync_at: None,
            sync_in_progress: false,
            total_records: 0,
            last_sync_error: None,
            updated_at,
        }
    }
}

impl TryFrom<SyncMetadataDB> for SyncMetadata {
    type Error = Error;

    fn try_from(row: SyncMetadataDB) -> Result<Self> {
        Ok(SyncMetadata {
            entity_type: row.entity_type.parse()?,
            last_full_sync_at: timestamp_opt_from_db(row.last_full_sync_at.as_deref())?,
            last_incremental_sync_at: timestamp_opt_from_db(
                row.last_incremental_sync_at.as_deref(),
            )?,
            sync_in_progress: row.sync_in_progress,
            total_records: row.total_records,
            last_sync_error: row.last_sync_error,
            updated_at: timestamp_from_db(&row.updated_at)?,
        })
    }
}
