use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::info;
use std::sync::Arc;

use crm_replica_core::sync::{SyncRun, SyncRunRepositoryTrait, SyncRunStatus};
use crm_replica_core::Result;

use super::model::SyncRunDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sync_metadata, sync_runs};
use crate::utils::timestamp_to_db;

const CANCELLED_MESSAGE: &str = "Cancelled while in flight";

pub struct SyncRunRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncRunRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        SyncRunRepository { pool, writer }
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    async fn insert_run(&self, run: SyncRun) -> Result<()> {
        let row = SyncRunDB::from(run);
        self.writer
            .exec(move |conn| -> Result<()> {
                diesel::insert_into(sync_runs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn update_run(&self, run: SyncRun) -> Result<()> {
        let row = SyncRunDB::from(run);
        self.writer
            .exec(move |conn| -> Result<()> {
                diesel::update(sync_runs::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_recent_runs(&self, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .order(sync_runs::started_at.desc())
            .limit(limit.max(0))
            .load::<SyncRunDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(SyncRun::try_from)
            .collect()
    }

    async fn cancel_in_flight(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| -> Result<usize> {
                let now = timestamp_to_db(Utc::now());
                let cancelled = diesel::update(
                    sync_runs::table
                        .filter(sync_runs::status.eq(SyncRunStatus::Running.as_str())),
                )
                .set((
                    sync_runs::status.eq(SyncRunStatus::Cancelled.as_str()),
                    sync_runs::finished_at.eq(&now),
                    sync_runs::error_message.eq(CANCELLED_MESSAGE),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

                let released = diesel::update(
                    sync_metadata::table.filter(sync_metadata::sync_in_progress.eq(true)),
                )
                .set((
                    sync_metadata::sync_in_progress.eq(false),
                    sync_metadata::updated_at.eq(&now),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

                info!(
                    "[CrmSync] Cancelled {} in-flight runs, released {} in-progress flags",
                    cancelled, released
                );
                Ok(cancelled)
            })
            .await
    }
}
