//! In-process coordination store.
//!
//! Keeps the full [`CoordinationStore`] contract without a network hop:
//!
//! - a single store-wide revision counter, bumped once per write
//! - retained change history, so a watch can start at any revision newer than
//!   the last [`compact`](MemoryStore::compact); history beyond
//!   [`with_history_limit`](MemoryStore::with_history_limit) revisions is
//!   compacted on write
//! - history replay and live registration happen under one lock, so a watch
//!   anchored at `R+1` after a read at `R` sees every later change exactly once
//! - leases with deadlines; a reaper task deletes the keys of expired leases
//!   in a single revision
//!
//! All state sits behind one `parking_lot::Mutex`. The lock is never held
//! across an `.await`.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::CoordinationStore;
use super::KeepAliveStream;
use super::KeyValue;
use super::LeaseId;
use super::LeaseKeepAlive;
use super::RangeResponse;
use super::ReadConsistency;
use super::WatchEvent;
use super::WatchEventStream;
use super::WatchEventType;
use super::WatchResponse;
use crate::StoreError;
use crate::StoreResult;

const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(100);
const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    mod_revision: i64,
    lease: Option<LeaseId>,
}

#[derive(Debug)]
struct LeaseState {
    ttl_secs: i64,
    deadline: Instant,
    keys: HashSet<String>,
}

#[derive(Debug)]
struct HistoryEntry {
    revision: i64,
    events: Vec<WatchEvent>,
}

#[derive(Debug)]
struct WatcherSlot {
    prefix: String,
    sender: mpsc::UnboundedSender<StoreResult<WatchResponse>>,
}

#[derive(Debug, Default)]
struct StoreState {
    revision: i64,
    compact_revision: i64,
    kvs: BTreeMap<String, StoredValue>,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
    watchers: Vec<WatcherSlot>,
    leases: HashMap<LeaseId, LeaseState>,
    reaper_started: bool,
    shut_down: bool,
}

impl StoreState {
    fn ensure_running(&self) -> StoreResult<()> {
        if self.shut_down {
            return Err(StoreError::Unavailable("store has been shut down".into()));
        }
        Ok(())
    }

    /// Commits `events` as one revision and fans them out to matching watchers.
    fn commit(
        &mut self,
        revision: i64,
        events: Vec<WatchEvent>,
    ) {
        self.watchers.retain(|watcher| {
            let matching: Vec<WatchEvent> = events
                .iter()
                .filter(|e| e.kv.key.starts_with(watcher.prefix.as_bytes()))
                .cloned()
                .collect();
            if matching.is_empty() {
                return !watcher.sender.is_closed();
            }
            watcher
                .sender
                .send(Ok(WatchResponse {
                    revision,
                    events: matching,
                }))
                .is_ok()
        });
        self.history.push_back(HistoryEntry { revision, events });
        while self.history.len() > self.history_limit {
            if let Some(dropped) = self.history.pop_front() {
                self.compact_revision = self.compact_revision.max(dropped.revision + 1);
            }
        }
    }

    fn next_revision(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }

    fn unbind_from_lease(
        &mut self,
        key: &str,
        lease: Option<LeaseId>,
    ) {
        if let Some(lease) = lease {
            if let Some(state) = self.leases.get_mut(&lease) {
                state.keys.remove(key);
            }
        }
    }

    /// Removes `keys` in a single revision. Returns `None` when nothing was removed.
    fn delete_keys(
        &mut self,
        keys: Vec<String>,
    ) -> Option<i64> {
        let present: Vec<String> = keys.into_iter().filter(|k| self.kvs.contains_key(k)).collect();
        if present.is_empty() {
            return None;
        }

        let revision = self.next_revision();
        let mut events = Vec::with_capacity(present.len());
        for key in present {
            if let Some(old) = self.kvs.remove(&key) {
                self.unbind_from_lease(&key, old.lease);
            }
            events.push(WatchEvent {
                event_type: WatchEventType::Delete,
                kv: KeyValue {
                    key: Bytes::from(key),
                    value: Bytes::new(),
                    mod_revision: revision,
                    lease: None,
                },
            });
        }
        self.commit(revision, events);
        Some(revision)
    }

    fn remove_lease(
        &mut self,
        lease: LeaseId,
    ) -> StoreResult<()> {
        let state = self.leases.remove(&lease).ok_or(StoreError::LeaseNotFound(lease))?;
        let mut keys: Vec<String> = state.keys.into_iter().collect();
        keys.sort();
        self.delete_keys(keys);
        Ok(())
    }
}

/// In-memory [`CoordinationStore`]; clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    reap_interval: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_reap_interval(DEFAULT_REAP_INTERVAL)
    }

    /// Creates a store whose lease reaper wakes up every `reap_interval`.
    pub fn with_reap_interval(reap_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                history_limit: DEFAULT_HISTORY_LIMIT,
                ..StoreState::default()
            })),
            reap_interval,
        }
    }

    /// Retains at most `limit` revisions of history (at least one).
    /// Watches starting before the oldest retained revision fail as compacted.
    pub fn with_history_limit(
        self,
        limit: usize,
    ) -> Self {
        self.state.lock().history_limit = limit.max(1);
        self
    }

    /// Number of revisions currently kept for watch replay
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Current store revision
    pub fn revision(&self) -> i64 {
        self.state.lock().revision
    }

    /// Value currently stored under `key`
    pub fn value(
        &self,
        key: &str,
    ) -> Option<Bytes> {
        self.state.lock().kvs.get(key).map(|v| v.value.clone())
    }

    /// Lease currently bound to `key`
    pub fn lease_of(
        &self,
        key: &str,
    ) -> Option<LeaseId> {
        self.state.lock().kvs.get(key).and_then(|v| v.lease)
    }

    pub fn is_lease_alive(
        &self,
        lease: LeaseId,
    ) -> bool {
        self.state.lock().leases.contains_key(&lease)
    }

    pub fn lease_count(&self) -> usize {
        self.state.lock().leases.len()
    }

    /// Number of open watch streams
    pub fn watcher_count(&self) -> usize {
        let mut state = self.state.lock();
        state.watchers.retain(|w| !w.sender.is_closed());
        state.watchers.len()
    }

    /// Discards history older than `revision`; watches starting before it fail.
    pub fn compact(
        &self,
        revision: i64,
    ) {
        let mut state = self.state.lock();
        state.compact_revision = revision.max(state.compact_revision);
        let compact_revision = state.compact_revision;
        state.history.retain(|h| h.revision >= compact_revision);
    }

    /// Terminates every open watch with `reason` as its final item.
    pub fn cancel_watches(
        &self,
        reason: StoreError,
    ) {
        let mut state = self.state.lock();
        for watcher in state.watchers.drain(..) {
            let _ = watcher.sender.send(Err(reason.clone()));
        }
    }

    /// Makes every subsequent call fail and ends all open watch streams.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.watchers.clear();
        debug!("memory store shut down");
    }

    /// Deletes the keys of every lease whose deadline has passed.
    /// Returns the expired lease ids.
    pub fn expire_leases(&self) -> Vec<LeaseId> {
        Self::expire_leases_in(&mut self.state.lock())
    }

    fn expire_leases_in(state: &mut StoreState) -> Vec<LeaseId> {
        let now = Instant::now();
        let mut expired: Vec<LeaseId> = state
            .leases
            .iter()
            .filter(|(_, l)| l.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort();
        for lease in &expired {
            debug!(%lease, "lease expired");
            let _ = state.remove_lease(*lease);
        }
        expired
    }

    fn start_reaper(
        &self,
        state: &mut StoreState,
    ) {
        if state.reaper_started {
            return;
        }
        state.reaper_started = true;

        let weak: Weak<Mutex<StoreState>> = Arc::downgrade(&self.state);
        let interval = self.reap_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                let mut state = state.lock();
                if state.shut_down {
                    break;
                }
                Self::expire_leases_in(&mut state);
            }
            trace!("lease reaper stopped");
        });
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn grant(
        &self,
        ttl_secs: i64,
    ) -> StoreResult<LeaseId> {
        if ttl_secs <= 0 {
            return Err(StoreError::Unavailable(format!("invalid lease ttl {ttl_secs}")));
        }

        let mut state = self.state.lock();
        state.ensure_running()?;
        self.start_reaper(&mut state);

        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = LeaseId(rng.gen_range(1..i64::MAX));
            if !state.leases.contains_key(&candidate) {
                break candidate;
            }
        };
        state.leases.insert(
            id,
            LeaseState {
                ttl_secs,
                deadline: Instant::now() + Duration::from_secs(ttl_secs as u64),
                keys: HashSet::new(),
            },
        );
        trace!(lease = %id, ttl_secs, "lease granted");
        Ok(id)
    }

    async fn revoke(
        &self,
        lease: LeaseId,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.remove_lease(lease)
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
    ) -> StoreResult<KeepAliveStream> {
        let ttl_secs = {
            let state = self.state.lock();
            state.ensure_running()?;
            state.leases.get(&lease).ok_or(StoreError::LeaseNotFound(lease))?.ttl_secs
        };

        let interval = (Duration::from_secs(ttl_secs as u64) / 3).max(MIN_KEEP_ALIVE_INTERVAL);
        let weak = Arc::downgrade(&self.state);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                let renewed = {
                    let Some(state) = weak.upgrade() else {
                        break;
                    };
                    let mut state = state.lock();
                    if state.shut_down {
                        Err(StoreError::Closed)
                    } else {
                        match state.leases.get_mut(&lease) {
                            Some(l) => {
                                l.deadline = Instant::now() + Duration::from_secs(l.ttl_secs as u64);
                                Ok(LeaseKeepAlive {
                                    id: lease,
                                    ttl_secs: l.ttl_secs,
                                })
                            }
                            None => Err(StoreError::LeaseNotFound(lease)),
                        }
                    }
                };

                let lost = renewed.is_err();
                if tx.send(renewed).await.is_err() || lost {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = tx.closed() => break,
                }
            }
            trace!(%lease, "keep-alive stream finished");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> StoreResult<i64> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        if let Some(lease) = lease {
            if !state.leases.contains_key(&lease) {
                return Err(StoreError::LeaseNotFound(lease));
            }
        }

        let revision = state.next_revision();
        let previous = state.kvs.insert(
            key.to_string(),
            StoredValue {
                value: value.clone(),
                mod_revision: revision,
                lease,
            },
        );
        if let Some(previous) = previous {
            if previous.lease != lease {
                state.unbind_from_lease(key, previous.lease);
            }
        }
        if let Some(lease) = lease {
            if let Some(l) = state.leases.get_mut(&lease) {
                l.keys.insert(key.to_string());
            }
        }

        state.commit(
            revision,
            vec![WatchEvent {
                event_type: WatchEventType::Put,
                kv: KeyValue {
                    key: Bytes::copy_from_slice(key.as_bytes()),
                    value,
                    mod_revision: revision,
                    lease,
                },
            }],
        );
        Ok(revision)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> StoreResult<i64> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        Ok(state.delete_keys(vec![key.to_string()]).unwrap_or(state.revision))
    }

    async fn get_prefix(
        &self,
        prefix: &str,
        _consistency: ReadConsistency,
    ) -> StoreResult<RangeResponse> {
        let state = self.state.lock();
        state.ensure_running()?;
        let kvs = state
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue {
                key: Bytes::copy_from_slice(k.as_bytes()),
                value: v.value.clone(),
                mod_revision: v.mod_revision,
                lease: v.lease,
            })
            .collect();
        Ok(RangeResponse {
            revision: state.revision,
            kvs,
        })
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> StoreResult<WatchEventStream> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        if start_revision > 0 && start_revision < state.compact_revision {
            let err = StoreError::Compacted {
                requested: start_revision,
                compacted: state.compact_revision,
            };
            return Ok(stream::once(async move { Err(err) }).boxed());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if start_revision > 0 {
            for entry in state.history.iter().filter(|h| h.revision >= start_revision) {
                let events: Vec<WatchEvent> = entry
                    .events
                    .iter()
                    .filter(|e| e.kv.key.starts_with(prefix.as_bytes()))
                    .cloned()
                    .collect();
                if !events.is_empty() {
                    let _ = tx.send(Ok(WatchResponse {
                        revision: entry.revision,
                        events,
                    }));
                }
            }
        }
        state.watchers.push(WatcherSlot {
            prefix: prefix.to_string(),
            sender: tx,
        });
        trace!(prefix, start_revision, "watch registered");

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
