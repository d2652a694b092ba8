use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::BoxError;
use crate::async_task::join_task;
use crate::async_task::spawn_task;
use crate::metrics::BATCHES_PUBLISHED_METRIC;
use crate::metrics::SUBSCRIBER_ERRORS_METRIC;
use crate::CoordinationStore;
use crate::Merger;
use crate::Result;
use crate::WatchBatch;
use crate::WatchConfig;
use crate::WatchStats;
use crate::Watcher;

/// Hands the merged instance set to one kind of subscriber
#[async_trait]
pub(crate) trait StatePublisher: Send + Sync + 'static {
    /// Metric label identifying the adapter
    fn adapter(&self) -> &'static str;

    async fn publish(
        &self,
        target: &str,
        merger: &Merger,
    ) -> std::result::Result<(), BoxError>;
}

struct Handles {
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// Watcher plus the consumer task that merges and publishes its batches.
///
/// Cancelling the token stops both tasks. [`close`](ResolverTask::close)
/// additionally waits for them, so no publish can start after it returns.
pub(crate) struct ResolverTask {
    token: CancellationToken,
    handles: Mutex<Option<Handles>>,
    stats: Arc<WatchStats>,
}

impl ResolverTask {
    pub(crate) async fn start<P: StatePublisher>(
        store: Arc<dyn CoordinationStore>,
        target: &str,
        config: &WatchConfig,
        publisher: P,
    ) -> Result<Self> {
        let token = CancellationToken::new();
        let stream = Watcher::new(store, target, config.clone())
            .open(token.clone())
            .await?;

        let consumer = spawn_task(
            "resolver-consumer",
            consume(target.to_string(), stream.receiver, token.clone(), publisher),
        );

        Ok(Self {
            token,
            handles: Mutex::new(Some(Handles {
                producer: stream.handle,
                consumer,
            })),
            stats: stream.stats,
        })
    }

    pub(crate) fn stats(&self) -> &WatchStats {
        &self.stats
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels both tasks and waits for them. Later calls wait for the first to finish.
    pub(crate) async fn close(&self) {
        self.token.cancel();
        let mut handles = self.handles.lock().await;
        if let Some(Handles { producer, consumer }) = handles.take() {
            join_task("resolver-consumer", consumer).await;
            join_task("watch-producer", producer).await;
        }
    }
}

impl Drop for ResolverTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn consume<P: StatePublisher>(
    target: String,
    mut receiver: mpsc::Receiver<WatchBatch>,
    token: CancellationToken,
    publisher: P,
) {
    let adapter = publisher.adapter();
    let mut merger = Merger::new();

    loop {
        let batch = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%target, adapter, "resolver cancelled");
                break;
            }
            batch = receiver.recv() => batch,
        };
        let Some(batch) = batch else {
            debug!(%target, adapter, "watch ended, resolver stops publishing");
            break;
        };

        merger.apply(&batch.updates);
        trace!(
            %target,
            adapter,
            revision = batch.revision,
            instances = merger.len(),
            "publishing merged instances"
        );

        match publisher.publish(&target, &merger).await {
            Ok(()) => BATCHES_PUBLISHED_METRIC
                .with_label_values(&[target.as_str(), adapter])
                .inc(),
            Err(e) => {
                warn!(%target, adapter, error = %e, "subscriber rejected update");
                SUBSCRIBER_ERRORS_METRIC
                    .with_label_values(&[target.as_str(), adapter])
                    .inc();
            }
        }
    }
}
