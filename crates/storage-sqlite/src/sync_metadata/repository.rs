use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crm_replica_core::entities::EntityType;
use crm_replica_core::sync::{SyncCompletion, SyncMetadata, SyncMetadataRepositoryTrait};
use crm_replica_core::Result;

use super::model::SyncMetadataDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_metadata;
use crate::utils::timestamp_to_db;

/// Inserts the default row for `entity` if it does not exist yet.
fn ensure_row(conn: &mut SqliteConnection, entity: EntityType, now: &str) -> Result<()> {
    diesel::insert_into(sync_metadata::table)
        .values(SyncMetadataDB::new(entity.as_str(), now.to_string()))
        .on_conflict(sync_metadata::entity_type)
        .do_nothing()
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub struct SyncMetadataRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncMetadataRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        SyncMetadataRepository { pool, writer }
    }
}

#[async_trait]
impl SyncMetadataRepositoryTrait for SyncMetadataRepository {
    fn get_metadata(&self, entity: EntityType) -> Result<Option<SyncMetadata>> {
        let mut conn = get_connection(&self.pool)?;
        sync_metadata::table
            .find(entity.as_str())
            .first::<SyncMetadataDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(SyncMetadata::try_from)
            .transpose()
    }

    fn list_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let mut conn = get_connection(&self.pool)?;
        sync_metadata::table
            .order(sync_metadata::entity_type.asc())
            .load::<SyncMetadataDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(SyncMetadata::try_from)
            .collect()
    }

    async fn mark_in_progress(&self, entity: EntityType) -> Result<()> {
        self.writer
            .exec(move |conn| -> Result<()> {
                let now = timestamp_to_db(Utc::now());
                ensure_row(conn, entity, &now)?;
                diesel::update(sync_metadata::table.find(entity.as_str()))
                    .set((
                        sync_metadata::sync_in_progress.eq(true),
                        sync_metadata::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_complete(&self, entity: EntityType, completion: SyncCompletion) -> Result<()> {
        self.writer
            .exec(move |conn| -> Result<()> {
                let now = timestamp_to_db(Utc::now());
                let completed_at = timestamp_to_db(completion.completed_at);
                ensure_row(conn, entity, &now)?;
                let target = sync_metadata::table.find(entity.as_str());
                let common = (
                    sync_metadata::sync_in_progress.eq(false),
                    sync_metadata::total_records.eq(completion.total_records),
                    sync_metadata::last_sync_error.eq(None::<String>),
                    sync_metadata::updated_at.eq(&now),
                );
                let updated = if completion.is_full_sync {
                    diesel::update(target)
                        .set((common, sync_metadata::last_full_sync_at.eq(&completed_at)))
                        .execute(conn)
                } else {
                    diesel::update(target)
                        .set((
                            common,
                            sync_metadata::last_incremental_sync_at.eq(&completed_at),
                        ))
                        .execute(conn)
                };
                updated.map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_failed(&self, entity: EntityType, error_message: String) -> Result<()> {
        self.writer
            .exec(move |conn| -> Result<()> {
                let now = timestamp_to_db(Utc::now());
                ensure_row(conn, entity, &now)?;
                diesel::update(sync_metadata::table.find(entity.as_str()))
                    .set((
                        sync_metadata::sync_in_progress.eq(false),
                        sync_metadata::last_sync_error.eq(Some(error_message)),
                        sync_metadata::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear_in_progress(&self, entity: Option<EntityType>) -> Result<usize> {
        self.writer
            .exec(move |conn| -> Result<usize> {
                let now = timestamp_to_db(Utc::now());
                let cleared = match entity {
                    Some(entity) => diesel::update(
                        sync_metadata::table
                            .filter(sync_metadata::entity_type.eq(entity.as_str()))
                            .filter(sync_metadata::sync_in_progress.eq(true)),
                    )
                    .set((
                        sync_metadata::sync_in_progress.eq(false),
                        sync_metadata::updated_at.eq(&now),
                    ))
                    .execute(conn),
                    None => diesel::update(
                        sync_metadata::table.filter(sync_metadata::sync_in_progress.eq(true)),
                    )
                    .set((
                        sync_metadata::sync_in_progress.eq(false),
                        sync_metadata::updated_at.eq(&now),
                    ))
                    .execute(conn),
                }
                .map_err(StorageError::from)?;
                Ok(cleared)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn setup_db() -> (tempfile::TempDir, SyncMetadataRepository) {
        let app_data = tempdir().expect("tempdir");
        let path = app_data.path().join("replica.db");
        let db_path = init(path.to_str().unwrap()).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        (app_data, SyncMetadataRepository::new(pool, writer))
    }

    #[tokio::test]
    async fn rows_are_created_lazily() {
        let (_dir, repo) = setup_db();
        assert!(repo.get_metadata(EntityType::Deals).unwrap().is_none());

        repo.mark_in_progress(EntityType::Deals).await.unwrap();

        let meta = repo.get_metadata(EntityType::Deals).unwrap().unwrap();
        assert!(meta.sync_in_progress);
        assert!(meta.last_full_sync_at.is_none());
        assert_eq!(repo.list_metadata().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incremental_completion_leaves_full_sync_time_alone() {
        let (_dir, repo) = setup_db();
        let full_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let incremental_at = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();

        repo.mark_complete(
            EntityType::Contacts,
            SyncCompletion {
                is_full_sync: true,
                total_records: 10,
                completed_at: full_at,
            },
        )
        .await
        .unwrap();
        repo.mark_complete(
            EntityType::Contacts,
            SyncCompletion {
                is_full_sync: false,
                total_records: 12,
                completed_at: incremental_at,
            },
        )
        .await
        .unwrap();

        let meta = repo.get_metadata(EntityType::Contacts).unwrap().unwrap();
        assert_eq!(meta.last_full_sync_at, Some(full_at));
        assert_eq!(meta.last_incremental_sync_at, Some(incremental_at));
        assert_eq!(meta.total_records, 12);
    }

    #[tokio::test]
    async fn failure_records_error_and_success_clears_it() {
        let (_dir, repo) = setup_db();
        repo.mark_in_progress(EntityType::Companies).await.unwrap();
        repo.mark_failed(EntityType::Companies, "Remote CRM error (502)".to_string())
            .await
            .unwrap();

        let failed = repo.get_metadata(EntityType::Companies).unwrap().unwrap();
        assert!(!failed.sync_in_progress);
        assert_eq!(failed.last_sync_error.as_deref(), Some("Remote CRM error (502)"));

        repo.mark_complete(
            EntityType::Companies,
            SyncCompletion {
                is_full_sync: true,
                total_records: 3,
                completed_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        let recovered = repo.get_metadata(EntityType::Companies).unwrap().unwrap();
        assert!(recovered.last_sync_error.is_none());
    }

    #[tokio::test]
    async fn clear_in_progress_targets_one_or_all() {
        let (_dir, repo) = setup_db();
        for entity in EntityType::ALL {
            repo.mark_in_progress(entity).await.unwrap();
        }

        assert_eq!(
            repo.clear_in_progress(Some(EntityType::Contacts)).await.unwrap(),
            1
        );
        assert_eq!(repo.clear_in_progress(None).await.unwrap(), 2);
        assert!(repo
            .list_metadata()
            .unwrap()
            .iter()
            .all(|m| !m.sync_in_progress));
    }
}
