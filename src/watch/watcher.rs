use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use super::decode_event;
use super::decode_kv;
use super::BatchKind;
use super::Update;
use super::WatchBatch;
use super::WatchStats;
use crate::async_task::spawn_task;
use crate::async_task::with_timeout;
use crate::constants::SOURCE_SNAPSHOT;
use crate::constants::SOURCE_WATCH;
use crate::service_key_prefix;
use crate::CoordinationStore;
use crate::Error;
use crate::ReadConsistency;
use crate::Result;
use crate::WatchConfig;
use crate::WatchEventStream;

/// Turns the keys of one service into an ordered stream of [`WatchBatch`]es.
///
/// Opening a watch reads a serializable snapshot of the service prefix at
/// revision `R`, delivers it as the first batch, then streams every change
/// from `R + 1` onwards. Nothing committed between the read and the watch
/// can be lost, and nothing at or before `R` is delivered twice.
pub struct Watcher {
    store: Arc<dyn CoordinationStore>,
    target: String,
    config: WatchConfig,
}

/// Live output of [`Watcher::open`].
///
/// `receiver` yields the snapshot batch first, then deltas. It closes once
/// the producer task exits: on cancellation, on a store error, or when the
/// store ends the watch. There is no reconnect.
pub struct WatchStream {
    pub receiver: mpsc::Receiver<WatchBatch>,
    /// Producer task; awaiting it after cancelling guarantees no further sends
    pub handle: JoinHandle<()>,
    pub stats: Arc<WatchStats>,
}

impl Watcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        target: impl Into<String>,
        config: WatchConfig,
    ) -> Self {
        Self {
            store,
            target: target.into(),
            config,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Reads the snapshot and opens the revision-anchored watch.
    ///
    /// Store failures on either step are returned here. Once this returns,
    /// failures only end the stream.
    pub async fn open(
        &self,
        token: CancellationToken,
    ) -> Result<WatchStream> {
        let prefix = service_key_prefix(&self.target);
        let stats = Arc::new(WatchStats::default());

        let snapshot = with_timeout(
            "get_prefix",
            self.config.initial_read_timeout(),
            self.store.get_prefix(&prefix, ReadConsistency::Serializable),
        )
        .await?;

        let updates: Vec<Update> = snapshot
            .kvs
            .iter()
            .filter_map(|kv| decode_kv(&self.target, SOURCE_SNAPSHOT, kv, &stats))
            .map(|(key, instance)| Update::Add { key, instance })
            .collect();

        let start_revision = snapshot.revision + 1;
        let events = self.store.watch_prefix(&prefix, start_revision).await?;

        let (tx, receiver) = mpsc::channel(self.config.batch_channel_capacity.max(1));
        tx.try_send(WatchBatch {
            kind: BatchKind::Snapshot,
            revision: snapshot.revision,
            updates,
        })
        .map_err(|e| Error::NotOperational(format!("snapshot batch could not be queued: {e}")))?;
        stats.record_forwarded();

        debug!(
            target = %self.target,
            revision = snapshot.revision,
            start_revision,
            "watch anchored after snapshot"
        );

        let handle = spawn_task(
            "watch-producer",
            forward_events(self.target.clone(), events, tx, token, stats.clone()),
        );

        Ok(WatchStream {
            receiver,
            handle,
            stats,
        })
    }
}

async fn forward_events(
    target: String,
    mut events: WatchEventStream,
    tx: mpsc::Sender<WatchBatch>,
    token: CancellationToken,
    stats: Arc<WatchStats>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%target, "watch cancelled");
                break;
            }
            _ = tx.closed() => {
                debug!(%target, "watch consumer dropped");
                break;
            }
            next = events.next() => next,
        };

        let response = match next {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                error!(%target, error = %e, "watch stream failed");
                break;
            }
            None => {
                info!(%target, "watch stream closed by store");
                break;
            }
        };

        let updates: Vec<Update> = response
            .events
            .iter()
            .filter_map(|event| decode_event(&target, SOURCE_WATCH, event, &stats))
            .collect();
        if updates.is_empty() {
            trace!(%target, revision = response.revision, "no usable updates in watch response");
            continue;
        }

        let batch = WatchBatch {
            kind: BatchKind::Delta,
            revision: response.revision,
            updates,
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%target, "watch cancelled while delivering");
                break;
            }
            sent = tx.send(batch) => {
                if sent.is_err() {
                    debug!(%target, "watch consumer dropped");
                    break;
                }
                stats.record_forwarded();
            }
        }
    }
}
