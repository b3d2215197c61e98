//! SQLite storage for the CRM replica.
//!
//! Implements the core repository traits with diesel over an r2d2 pool. Reads use pooled
//! connections; writes go through the single [`db::WriteHandle`] actor, one transaction per job.

pub mod db;
pub mod errors;
pub mod records;
pub mod schema;
pub mod sync_metadata;
pub mod sync_runs;
mod utils;

pub use errors::StorageError;
pub use records::RecordRepository;
pub use sync_metadata::SyncMetadataRepository;
pub use sync_runs::SyncRunRepository;
