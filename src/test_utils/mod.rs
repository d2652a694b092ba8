//! Helpers shared by the unit tests of every module

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::service_key;
use crate::CoordinationStore;
use crate::DiscoveryResult;
use crate::Instance;
use crate::MemoryStore;
use crate::WatchBatch;

pub(crate) const WAIT: Duration = Duration::from_secs(2);

pub(crate) fn instance(
    address: &str,
    port: u16,
    weight: i32,
) -> Instance {
    Instance {
        network: "tcp".into(),
        address: address.into(),
        port,
        weight,
        tags: Default::default(),
    }
}

/// Writes an encoded instance without a lease and returns its storage key
pub(crate) async fn put_instance(
    store: &MemoryStore,
    service: &str,
    instance: &Instance,
) -> String {
    let key = service_key(service, &instance.address, instance.port);
    let value = instance.encode().unwrap();
    store.put(&key, Bytes::from(value), None).await.unwrap();
    key
}

pub(crate) async fn put_raw(
    store: &MemoryStore,
    key: &str,
    value: &str,
) {
    store
        .put(key, Bytes::from(value.to_string()), None)
        .await
        .unwrap();
}

pub(crate) async fn next_batch(receiver: &mut mpsc::Receiver<WatchBatch>) -> WatchBatch {
    timeout(WAIT, receiver.recv())
        .await
        .expect("Timeout waiting for watch batch")
        .expect("Watch channel closed")
}

/// Collects every result handed to a generic resolver callback
#[derive(Clone, Default)]
pub(crate) struct RecordingSubscriber {
    results: Arc<Mutex<Vec<DiscoveryResult>>>,
    notify: Arc<tokio::sync::Notify>,
}

impl RecordingSubscriber {
    pub(crate) fn push(
        &self,
        result: DiscoveryResult,
    ) {
        self.results.lock().push(result);
        self.notify.notify_waiters();
    }

    pub(crate) fn results(&self) -> Vec<DiscoveryResult> {
        self.results.lock().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.results.lock().len()
    }

    /// Waits until at least `count` results were recorded
    pub(crate) async fn wait_for(
        &self,
        count: usize,
    ) -> Vec<DiscoveryResult> {
        timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
                    return self.results();
                }
                notified.await;
            }
        })
        .await
        .expect("Timeout waiting for resolver callback")
    }
}

pub(crate) fn shared(store: &MemoryStore) -> Arc<dyn CoordinationStore> {
    Arc::new(store.clone())
}
