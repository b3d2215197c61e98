//! Database model for persisted sync run history.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crm_replica_core::sync::SyncRun;
use crm_replica_core::{Error, Result};

use crate::utils::{timestamp_from_db, timestamp_opt_from_db, timestamp_opt_to_db, timestamp_to_db};

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
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SyncRunDB {
    pub id: String,
    pub entity_type: String,
    pub mode: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub fetched: i64,
    pub inserted: i64,
    pub modified: i64,
    pub errors: i64,
    pub error_message: Option<String>,
}

impl From<SyncRun> for SyncRunDB {
    fn from(run: SyncRun) -> Self {
        Self {
            id: run.id,
            entity_type: run.entity_type.as_str().to_string(),
            mode: run.mode.as_str().to_string(),
            status: run.status.as_str().to_string(),
            started_at: timestamp_to_db(run.started_at),
            finished_at: timestamp_opt_to_db(run.finished_at),
            fetched: run.fetched,
            inserted: run.inserted,
            modified: run.modified,
            errors: run.errors,
            error_message: run.error_message,
        }
    }
}

impl TryFrom<SyncRunDB> for SyncRun {
    type Error = Error;

    fn try_from(row: SyncRunDB) -> Result<Self> {
        Ok(SyncRun {
            id: row.id,
            entity_type: row.entity_type.parse()?,
            mode: row.mode.parse()?,
            status: row.status.parse()?,
            started_at: timestamp_from_db(&row.started_at)?,
            finished_at: timestamp_opt_from_db(row.finished_at.as_deref())?,
            fetched: row.fetched,
            inserted: row.inserted,
            modified: row.modified,
            errors: row.errors,
            error_message: row.error_message,
        })
    }
}
