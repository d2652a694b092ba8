//! Coordination store abstraction
//!
//! Discovery never talks to a concrete store directly. Registration and
//! resolution are written against [`CoordinationStore`], which captures the
//! contract of a strongly-consistent key-value store offering:
//!
//! - TTL leases with a keep-alive acknowledgement stream
//! - revision-stamped prefix reads
//! - revision-anchored prefix watches
//!
//! A store handle is injected into every registry, watcher and resolver
//! constructor as `Arc<dyn CoordinationStore>`. [`MemoryStore`] is the
//! in-process implementation used for embedding and tests.

mod mem_store;

pub use mem_store::*;


use std::fmt;

use bytes::Bytes;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::StoreResult;

/// Opaque lease identifier issued by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(pub i64);

impl fmt::Display for LeaseId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Read guarantee requested for a prefix scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Goes through the leader; reflects every committed write
    Linearizable,
    /// Served locally by any member; may lag, but carries its own revision
    Serializable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    /// Empty for delete events
    pub value: Bytes,
    pub mod_revision: i64,
    pub lease: Option<LeaseId>,
}

/// Result of a prefix scan, stamped with the store revision it was served at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    pub revision: i64,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub kv: KeyValue,
}

/// One group of change notifications, all committed at `revision`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub revision: i64,
    pub events: Vec<WatchEvent>,
}

/// Acknowledgement of one lease renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseKeepAlive {
    pub id: LeaseId,
    pub ttl_secs: i64,
}

/// Ordered change notifications. Ends when the watch is cancelled upstream;
/// an `Err` item is terminal.
pub type WatchEventStream = BoxStream<'static, StoreResult<WatchResponse>>;

/// Keep-alive acknowledgements. Ends when the lease can no longer be renewed.
pub type KeepAliveStream = BoxStream<'static, StoreResult<LeaseKeepAlive>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Grants a lease that expires `ttl_secs` after its last renewal.
    async fn grant(
        &self,
        ttl_secs: i64,
    ) -> StoreResult<LeaseId>;

    /// Revokes a lease, deleting every key bound to it.
    async fn revoke(
        &self,
        lease: LeaseId,
    ) -> StoreResult<()>;

    /// Starts renewing `lease`.
    ///
    /// A successful return is the renewal handshake; acknowledgements then
    /// arrive on the stream until it is dropped or the lease is lost.
    async fn keep_alive(
        &self,
        lease: LeaseId,
    ) -> StoreResult<KeepAliveStream>;

    /// Writes `value` under `key`, optionally bound to `lease`.
    /// Returns the revision of the write.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> StoreResult<i64>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn delete(
        &self,
        key: &str,
    ) -> StoreResult<i64>;

    /// Reads every key starting with `prefix`, in key order.
    async fn get_prefix(
        &self,
        prefix: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<RangeResponse>;

    /// Watches every key starting with `prefix`, replaying all changes with a
    /// revision at or after `start_revision` before live ones.
    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> StoreResult<WatchEventStream>;
}
