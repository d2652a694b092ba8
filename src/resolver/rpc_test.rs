use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::timeout;
use tonic::async_trait;

use super::*;
use crate::test_utils::instance;
use crate::test_utils::put_instance;
use crate::test_utils::shared;
use crate::test_utils::WAIT;
use crate::CoordinationStore;
use crate::Error;
use crate::MemoryStore;
use crate::WatchConfig;

#[derive(Default)]
struct RecordingConn {
    states: Mutex<Vec<ResolverState>>,
    fail: bool,
}

impl RecordingConn {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn addrs(
        &self,
        index: usize,
    ) -> Vec<String> {
        self.states.lock()[index].addresses.iter().map(|a| a.addr.clone()).collect()
    }

    async fn wait_for(
        &self,
        count: usize,
    ) {
        timeout(WAIT, async {
            while self.states.lock().len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timeout waiting for update_state");
    }
}

#[async_trait]
impl ClientConn for RecordingConn {
    async fn update_state(
        &self,
        state: ResolverState,
    ) -> std::result::Result<(), BoxError> {
        self.states.lock().push(state);
        if self.fail {
            return Err("connection is shutting down".into());
        }
        Ok(())
    }
}

fn builder(store: &MemoryStore) -> RpcResolverBuilder {
    RpcResolverBuilder::new(shared(store), WatchConfig::default())
}

#[test]
fn test_target_parse() {
    let target = Target::parse("etcd:///user-service").unwrap();
    assert_eq!(target.scheme, "etcd");
    assert_eq!(target.authority, "");
    assert_eq!(target.endpoint, "user-service");
    assert_eq!(target.to_string(), "etcd:///user-service");

    let with_authority = Target::parse("etcd://cluster-a/orders").unwrap();
    assert_eq!(with_authority.authority, "cluster-a");
    assert_eq!(with_authority.endpoint, "orders");
}

#[test]
fn test_target_parse_rejects_malformed() {
    assert!(matches!(Target::parse("user-service"), Err(Error::InvalidArgument(_))));
    assert!(matches!(Target::parse("etcd:///"), Err(Error::InvalidArgument(_))));
    assert!(matches!(Target::parse(":///svc"), Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn test_scheme_is_etcd() {
    let store = MemoryStore::new();
    assert_eq!(builder(&store).scheme(), "etcd");
}

#[tokio::test]
async fn test_pushes_address_lists_as_instances_change() {
    let store = MemoryStore::new();
    put_instance(&store, "svc", &instance("10.0.0.2", 9000, 10)).await;

    let conn = Arc::new(RecordingConn::default());
    let target = Target::parse("etcd:///svc").unwrap();
    let resolver = builder(&store).build(&target, conn.clone()).await.unwrap();
    assert_eq!(resolver.target(), "svc");
    assert_eq!(resolver.dial_target(), &target);

    conn.wait_for(1).await;
    assert_eq!(conn.addrs(0), vec!["10.0.0.2:9000"]);

    let key = put_instance(&store, "svc", &instance("10.0.0.1", 9000, 10)).await;
    conn.wait_for(2).await;
    assert_eq!(conn.addrs(1), vec!["10.0.0.1:9000", "10.0.0.2:9000"]);

    store.delete(&key).await.unwrap();
    conn.wait_for(3).await;
    assert_eq!(conn.addrs(2), vec!["10.0.0.2:9000"]);

    resolver.resolve_now();
    resolver.close().await;
}

#[tokio::test]
async fn test_update_state_error_keeps_resolver_running() {
    let store = MemoryStore::new();
    let conn = Arc::new(RecordingConn::failing());
    let target = Target::parse("etcd:///svc").unwrap();
    let resolver = builder(&store).build(&target, conn.clone()).await.unwrap();

    conn.wait_for(1).await;
    put_instance(&store, "svc", &instance("10.0.0.1", 80, 10)).await;
    conn.wait_for(2).await;

    resolver.close().await;
}

#[tokio::test]
async fn test_no_update_after_close() {
    let store = MemoryStore::new();
    let conn = Arc::new(RecordingConn::default());
    let target = Target::parse("etcd:///svc").unwrap();
    let resolver = builder(&store).build(&target, conn.clone()).await.unwrap();
    conn.wait_for(1).await;

    resolver.close().await;
    resolver.close().await;
    put_instance(&store, "svc", &instance("10.0.0.1", 80, 10)).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(conn.states.lock().len(), 1);
}

#[tokio::test]
async fn test_build_rejects_foreign_scheme() {
    let store = MemoryStore::new();
    let target = Target::parse("dns:///svc").unwrap();
    let result = builder(&store).build(&target, Arc::new(RecordingConn::default())).await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
