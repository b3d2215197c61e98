//! Detached background work with its own failure capture.

use log::{debug, error, warn};
use std::any::Any;
use std::future::Future;
use tokio::task::JoinHandle;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

/// Spawns `task` on the runtime and supervises it so a panic is logged rather than lost.
///
/// Callers may drop the returned handle; it only resolves once the task has ended.
pub fn spawn_background<F>(label: String, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::spawn(task).await {
            Ok(()) => debug!("[CrmSync] Background task '{}' finished", label),
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                error!(
                    "[CrmSync] Background task '{}' panicked: {}",
                    label,
                    panic_message(payload.as_ref())
                );
            }
            Err(err) => warn!("[CrmSync] Background task '{}' was cancelled: {}", label, err),
        }
    })
}
