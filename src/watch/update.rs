use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::warn;

use crate::metrics::DECODE_SKIPPED_METRIC;
use crate::DecodeError;
use crate::Instance;
use crate::KeyValue;
use crate::WatchEvent;
use crate::WatchEventType;

/// One change to the set of instances registered under a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Key was written; overwrites whatever was known for it
    Add { key: String, instance: Instance },
    /// Key was removed; the payload is not needed to retract it
    Delete { key: String },
}

impl Update {
    pub fn key(&self) -> &str {
        match self {
            Update::Add { key, .. } | Update::Delete { key } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Point-in-time read that anchors the watch; always delivered first, possibly empty
    Snapshot,
    /// Changes committed after the snapshot; never empty
    Delta,
}

/// Updates delivered together, applied as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBatch {
    pub kind: BatchKind,
    /// Store revision the batch reflects
    pub revision: i64,
    pub updates: Vec<Update>,
}

/// Per-watcher counters, shared with whoever owns the watch
#[derive(Debug, Default)]
pub struct WatchStats {
    decode_skipped: AtomicU64,
    batches_forwarded: AtomicU64,
}

impl WatchStats {
    /// Stored payloads dropped because they could not be decoded
    pub fn decode_skipped(&self) -> u64 {
        self.decode_skipped.load(Ordering::Relaxed)
    }

    /// Batches handed to the consumer, snapshot included
    pub fn batches_forwarded(&self) -> u64 {
        self.batches_forwarded.load(Ordering::Relaxed)
    }

    pub(crate) fn record_forwarded(&self) {
        self.batches_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(
        &self,
        target: &str,
        source: &'static str,
        err: &DecodeError,
    ) {
        warn!(%target, source, error = %err, "skipping undecodable instance");
        self.decode_skipped.fetch_add(1, Ordering::Relaxed);
        DECODE_SKIPPED_METRIC.with_label_values(&[target, source]).inc();
    }
}

fn decode_key(kv: &KeyValue) -> Result<String, DecodeError> {
    String::from_utf8(kv.key.to_vec())
        .map_err(|_| DecodeError::InvalidKey(String::from_utf8_lossy(&kv.key).into_owned()))
}

/// Decodes a stored key/value pair into its key and instance.
/// Failures are recorded on `stats` and yield `None`.
pub(crate) fn decode_kv(
    target: &str,
    source: &'static str,
    kv: &KeyValue,
    stats: &WatchStats,
) -> Option<(String, Instance)> {
    let decoded = decode_key(kv).and_then(|key| {
        let instance = Instance::decode(&key, &kv.value)?;
        Ok((key, instance))
    });
    match decoded {
        Ok(pair) => Some(pair),
        Err(e) => {
            stats.record_skip(target, source, &e);
            None
        }
    }
}

/// Turns one raw change notification into an [`Update`].
pub(crate) fn decode_event(
    target: &str,
    source: &'static str,
    event: &WatchEvent,
    stats: &WatchStats,
) -> Option<Update> {
    match event.event_type {
        WatchEventType::Put => {
            decode_kv(target, source, &event.kv, stats).map(|(key, instance)| Update::Add { key, instance })
        }
        WatchEventType::Delete => match decode_key(&event.kv) {
            Ok(key) => Some(Update::Delete { key }),
            Err(e) => {
                stats.record_skip(target, source, &e);
                None
            }
        },
    }
}
