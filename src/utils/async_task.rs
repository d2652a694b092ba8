use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::StoreError;
use crate::StoreResult;

/// Bounds a single-shot store call by `duration`.
///
/// Store errors pass through untouched; an elapsed deadline becomes
/// [`StoreError::Timeout`] tagged with `operation`.
pub(crate) async fn with_timeout<F, T>(
    operation: &'static str,
    duration: Duration,
    task: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match timeout(duration, task).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, ?duration, "store request timed out");
            Err(StoreError::Timeout { operation, duration })
        }
    }
}

/// Spawns a named background task and hands back its join handle.
///
/// Owners are expected to cancel the task's token and await the handle,
/// so a panic inside the task is only logged here.
pub(crate) fn spawn_task<Fut>(
    name: &'static str,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = ()> + Send + 'static,
{
    debug!(task = name, "spawning background task");
    tokio::spawn(task)
}

/// Awaits a background task, logging instead of propagating a join failure.
pub(crate) async fn join_task(
    name: &'static str,
    handle: JoinHandle<()>,
) {
    if let Err(e) = handle.await {
        warn!(task = name, error = ?e, "background task did not exit cleanly");
    }
}
