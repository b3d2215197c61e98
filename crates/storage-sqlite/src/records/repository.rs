use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

use crm_replica_core::entities::{EntityType, LocalRecord, RecordSyncStatus};
use crm_replica_core::sync::{RecordRepositoryTrait, UpsertCounts};
use crm_replica_core::Result;

use super::model::{CompanyDB, ContactDB, DealDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{companies, contacts, deals};
use crate::utils::{timestamp_opt_from_db, timestamp_to_db};

/// Encodes each record on its own; records that cannot be encoded are logged and counted
/// instead of failing the batch.
fn encode_rows<R>(entity: EntityType, records: Vec<LocalRecord>) -> (Vec<R>, usize)
where
    R: TryFrom<LocalRecord, Error = crm_replica_core::Error>,
{
    let mut rows = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        let remote_id = record.remote_id.clone();
        match R::try_from(record) {
            Ok(row) => rows.push(row),
            Err(err) => {
                warn!("Skipping {} record {}: {}", entity, remote_id, err);
                skipped += 1;
            }
        }
    }
    (rows, skipped)
}

/// Inserts unseen IDs and overwrites known ones, unless the stored row was synced later
/// than the incoming one.
///
/// `known` maps remote ID to stored `last_synced_at`; it is updated as rows are written so
/// a duplicate ID inside one batch becomes an update, not a second insert.
fn apply_upserts<R>(
    rows: Vec<R>,
    mut known: HashMap<String, String>,
    key: impl Fn(&R) -> (String, String),
    mut write: impl FnMut(&R, bool) -> QueryResult<usize>,
) -> Result<UpsertCounts> {
    let mut counts = UpsertCounts::default();
    for row in rows {
        let (remote_id, synced_at) = key(&row);
        match known.get(&remote_id) {
            None => {
                write(&row, true).map_err(StorageError::from)?;
                counts.inserted += 1;
            }
            Some(stored) if stored.as_str() <= synced_at.as_str() => {
                write(&row, false).map_err(StorageError::from)?;
                counts.modified += 1;
            }
            Some(_) => continue,
        }
        known.insert(remote_id, synced_at);
    }
    Ok(counts)
}

fn upsert_contacts(conn: &mut SqliteConnection, rows: Vec<ContactDB>) -> Result<UpsertCounts> {
    let ids = rows.iter().map(|r| r.remote_id.clone()).collect::<Vec<_>>();
    let known = contacts::table
        .filter(contacts::remote_id.eq_any(&ids))
        .select((contacts::remote_id, contacts::last_synced_at))
        .load::<(String, String)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .collect();
    apply_upserts(
        rows,
        known,
        |r| (r.remote_id.clone(), r.last_synced_at.clone()),
        |row, is_new| {
            if is_new {
                diesel::insert_into(contacts::table).values(row).execute(conn)
            } else {
                diesel::update(contacts::table.find(&row.remote_id))
                    .set(row)
                    .execute(conn)
            }
        },
    )
}

fn upsert_companies(conn: &mut SqliteConnection, rows: Vec<CompanyDB>) -> Result<UpsertCounts> {
    let ids = rows.iter().map(|r| r.remote_id.clone()).collect::<Vec<_>>();
    let known = companies::table
        .filter(companies::remote_id.eq_any(&ids))
        .select((companies::remote_id, companies::last_synced_at))
        .load::<(String, String)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .collect();
    apply_upserts(
        rows,
        known,
        |r| (r.remote_id.clone(), r.last_synced_at.clone()),
        |row, is_new| {
            if is_new {
                diesel::insert_into(companies::table)
                    .values(row)
                    .execute(conn)
            } else {
                diesel::update(companies::table.find(&row.remote_id))
                    .set(row)
                    .execute(conn)
            }
        },
    )
}

fn upsert_deals(conn: &mut SqliteConnection, rows: Vec<DealDB>) -> Result<UpsertCounts> {
    let ids = rows.iter().map(|r| r.remote_id.clone()).collect::<Vec<_>>();
    let known = deals::table
        .filter(deals::remote_id.eq_any(&ids))
        .select((deals::remote_id, deals::last_synced_at))
        .load::<(String, String)>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .collect();
    apply_upserts(
        rows,
        known,
        |r| (r.remote_id.clone(), r.last_synced_at.clone()),
        |row, is_new| {
            if is_new {
                diesel::insert_into(deals::table).values(row).execute(conn)
            } else {
                diesel::update(deals::table.find(&row.remote_id))
                    .set(row)
                    .execute(conn)
            }
        },
    )
}

pub struct RecordRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl RecordRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        RecordRepository { pool, writer }
    }

    async fn write_rows<R>(
        &self,
        entity: EntityType,
        records: Vec<LocalRecord>,
        upsert: fn(&mut SqliteConnection, Vec<R>) -> Result<UpsertCounts>,
    ) -> Result<UpsertCounts>
    where
        R: TryFrom<LocalRecord, Error = crm_replica_core::Error> + Send + 'static,
    {
        let (rows, skipped) = encode_rows::<R>(entity, records);
        let mut counts = if rows.is_empty() {
            UpsertCounts::default()
        } else {
            self.writer.exec(move |conn| upsert(conn, rows)).await?
        };
        counts.errors += skipped;
        Ok(counts)
    }
}

#[async_trait]
impl RecordRepositoryTrait for RecordRepository {
    async fn upsert_batch(
        &self,
        entity: EntityType,
        records: Vec<LocalRecord>,
    ) -> Result<UpsertCounts> {
        match entity {
            EntityType::Contacts => self.write_rows(entity, records, upsert_contacts).await,
            EntityType::Companies => self.write_rows(entity, records, upsert_companies).await,
            EntityType::Deals => self.write_rows(entity, records, upsert_deals).await,
        }
    }

    async fn sweep_stale(&self, entity: EntityType, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = timestamp_to_db(older_than);
        let synced = RecordSyncStatus::Synced.as_str();
        let pending = RecordSyncStatus::Pending.as_str();
        self.writer
            .exec(move |conn| -> Result<usize> {
                let swept = match entity {
                    EntityType::Contacts => diesel::update(
                        contacts::table
                            .filter(contacts::sync_status.eq(synced))
                            .filter(contacts::last_synced_at.lt(&cutoff)),
                    )
                    .set(contacts::sync_status.eq(pending))
                    .execute(conn),
                    EntityType::Companies => diesel::update(
                        companies::table
                            .filter(companies::sync_status.eq(synced))
                            .filter(companies::last_synced_at.lt(&cutoff)),
                    )
                    .set(companies::sync_status.eq(pending))
                    .execute(conn),
                    EntityType::Deals => diesel::update(
                        deals::table
                            .filter(deals::sync_status.eq(synced))
                            .filter(deals::last_synced_at.lt(&cutoff)),
                    )
                    .set(deals::sync_status.eq(pending))
                    .execute(conn),
                }
                .map_err(StorageError::from)?;
                Ok(swept)
            })
            .await
    }

    fn latest_synced_at(&self, entity: EntityType) -> Result<Option<DateTime<Utc>>> {
        let mut conn = get_connection(&self.pool)?;
        let latest = match entity {
            EntityType::Contacts => contacts::table
                .select(max(contacts::last_synced_at))
                .first::<Option<String>>(&mut conn),
            EntityType::Companies => companies::table
                .select(max(companies::last_synced_at))
                .first::<Option<String>>(&mut conn),
            EntityType::Deals => deals::table
                .select(max(deals::last_synced_at))
                .first::<Option<String>>(&mut conn),
        }
        .map_err(StorageError::from)?;
        timestamp_opt_from_db(latest.as_deref())
    }

    fn count(&self, entity: EntityType) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = match entity {
            EntityType::Contacts => contacts::table.count().get_result::<i64>(&mut conn),
            EntityType::Companies => companies::table.count().get_result::<i64>(&mut conn),
            EntityType::Deals => deals::table.count().get_result::<i64>(&mut conn),
        }
        .map_err(StorageError::from)?;
        Ok(total)
    }

    fn get_record(&self, entity: EntityType, remote_id: &str) -> Result<Option<LocalRecord>> {
        let mut conn = get_connection(&self.pool)?;
        match entity {
            EntityType::Contacts => contacts::table
                .find(remote_id)
                .first::<ContactDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(LocalRecord::try_from)
                .transpose(),
            EntityType::Companies => companies::table
                .find(remote_id)
                .first::<CompanyDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(LocalRecord::try_from)
                .transpose(),
            EntityType::Deals => deals::table
                .find(remote_id)
                .first::<DealDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?
                .map(LocalRecord::try_from)
                .transpose(),
        }
    }
}
