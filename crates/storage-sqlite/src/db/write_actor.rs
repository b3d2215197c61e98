//! Serialises every write through one dedicated thread.
//!
//! SQLite allows a single writer at a time; funnelling writes through one queue keeps
//! concurrent syncs of different entity types from fighting over the write lock.
//! Each job runs inside its own transaction.

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use crm_replica_core::{Error, Result};

use super::{get_connection, DbPool};
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&DbPool) + Send>;

/// Error carried out of a diesel transaction closure.
enum TxError {
    Diesel(diesel::result::Error),
    App(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

fn run_in_transaction<T, F>(pool: &DbPool, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    let mut pooled = get_connection(pool)?;
    let conn: &mut SqliteConnection = &mut pooled;
    conn.transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::App))
        .map_err(|err| match err {
            TxError::App(e) => e,
            TxError::Diesel(e) => StorageError::from(e).into(),
        })
}

#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread in a transaction; an `Err` rolls the whole job back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let task: Job = Box::new(move |pool: &DbPool| {
            let _ = reply.send(run_in_transaction(pool, job));
        });
        self.sender
            .send(task)
            .map_err(|_| StorageError::WriterClosed)?;
        response.await.map_err(|_| StorageError::WriterClosed)?
    }
}

pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("crm-replica-writer".to_string())
        .spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                job(&pool);
            }
        });
    if let Err(err) = spawned {
        error!("Failed to start database writer thread: {}", err);
    }
    WriteHandle { sender }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations};
    use diesel::prelude::*;
    use tempfile::tempdir;

    fn writer() -> (tempfile::TempDir, WriteHandle, std::sync::Arc<DbPool>) {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("writer.db");
        let db_path = init(path.to_str().unwrap()).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let handle = spawn_writer(pool.as_ref().clone());
        (dir, handle, pool)
    }

    #[tokio::test]
    async fn failed_job_rolls_back() {
        let (_dir, handle, pool) = writer();

        let outcome = handle
            .exec(|conn| -> Result<()> {
                diesel::sql_query(
                    "INSERT INTO sync_runs (id, entity_type, mode, status, started_at, fetched, inserted, modified, errors) \
                     VALUES ('r-1', 'contacts', 'full', 'running', '2025-01-01T00:00:00.000000Z', 0, 0, 0, 0)",
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Err(Error::Internal("abort".to_string()))
            })
            .await;
        assert!(outcome.is_err());

        let mut conn = get_connection(&pool).unwrap();
        let remaining: i64 = crate::schema::sync_runs::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn jobs_return_values() {
        let (_dir, handle, _pool) = writer();
        let value = handle.exec(|_conn| Ok(42)).await.unwrap();
        assert_eq!(value, 42);
    }
}
