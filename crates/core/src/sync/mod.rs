//! Remote → local replica synchronization engine.

mod association_resolver;
mod background;
mod config;
mod entity_syncer;
mod lock;
mod metadata_store;
mod orchestrator;
mod record_store;
mod sync_model;
mod traits;

pub use association_resolver::*;
pub use background::*;
pub use config::*;
pub use entity_syncer::*;
pub use lock::*;
pub use metadata_store::*;
pub use orchestrator::*;
pub use record_store::*;
pub use sync_model::*;
pub use traits::*;
