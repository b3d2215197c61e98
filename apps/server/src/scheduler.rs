//! Periodic freshness checks for the replica.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crm_replica_core::sync::SyncOrchestrator;

/// Every `period`, starts full syncs for stale entity types and then an incremental pass.
/// The first tick fires immediately. Ticks missed while the runtime was busy are skipped.
pub fn spawn_sync_scheduler(
    orchestrator: Arc<SyncOrchestrator>,
    period: Duration,
    max_age_hours: i64,
) -> JoinHandle<()> {
    info!(
        "[Scheduler] Periodic sync every {}s (max age {}h)",
        period.as_secs(),
        max_age_hours
    );
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let ensured = orchestrator.ensure_data_synced(max_age_hours);
            if ensured.triggered {
                info!(
                    "[Scheduler] Started full sync for stale types: {:?}",
                    ensured.entities
                );
            }
            debug!("[Scheduler] Triggering incremental sync");
            orchestrator.trigger_incremental_sync(max_age_hours);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::main_lib::test_support::{harness, wait_for};
    use crm_replica_core::entities::EntityType;

    #[tokio::test]
    async fn first_tick_brings_stale_types_up_to_date() {
        let h = harness().await;
        let handle = spawn_sync_scheduler(
            h.state.orchestrator.clone(),
            Duration::from_millis(50),
            24,
        );

        let orchestrator = h.state.orchestrator.clone();
        wait_for(|| {
            orchestrator
                .get_status()
                .map(|s| s.values().all(|e| !e.needs_sync))
                .unwrap_or(false)
        })
        .await;

        let status = h.state.orchestrator.get_status().unwrap();
        assert_eq!(status[&EntityType::Contacts].total_records, 3);
        handle.abort();
    }
}
