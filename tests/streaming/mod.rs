use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use d_engine_discovery::BalanceChannelConn;
use d_engine_discovery::Endpoint;
use d_engine_discovery::Registry;
use d_engine_discovery::Resolver;
use d_engine_discovery::Target;
use d_engine_discovery::http_endpoint;
use tokio::time::sleep;

use crate::common::TestDiscovery;
use crate::common::Updates;

#[tokio::test]
async fn test_streaming_watch_empty_one_empty() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();
    let updates = Updates::default();
    let sink = updates.clone();

    let resolver = discovery
        .watch_builder()
        .build("inventory", move |result| {
            sink.push(result);
            Ok(())
        })
        .await
        .unwrap();

    assert!(updates.wait_for(1).await.instances.is_empty());

    let endpoint = Endpoint::new("inventory", "tcp", "10.1.0.1", 5000);
    registry.register(&endpoint).await.unwrap();
    let second = updates.wait_for(2).await;
    assert_eq!(second.instances.len(), 1);
    assert_eq!(second.instances[0].addr(), "10.1.0.1:5000");
    assert_eq!(second.cache_key, "inventory");

    registry.deregister(&endpoint).await.unwrap();
    assert!(updates.wait_for(3).await.instances.is_empty());

    resolver.close().await;
}

#[tokio::test]
async fn test_close_guarantees_no_later_callback() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();
    let closed = Arc::new(AtomicBool::new(false));
    let late = Arc::new(AtomicBool::new(false));

    let resolver = {
        let closed = closed.clone();
        let late = late.clone();
        discovery
            .watch_builder()
            .build("search", move |_| {
                if closed.load(Ordering::SeqCst) {
                    late.store(true, Ordering::SeqCst);
                }
                Ok(())
            })
            .await
            .unwrap()
    };

    for port in 1..=20u16 {
        registry
            .register(&Endpoint::new("search", "tcp", "10.2.0.1", port))
            .await
            .unwrap();
    }
    resolver.close().await;
    closed.store(true, Ordering::SeqCst);

    registry
        .register(&Endpoint::new("search", "tcp", "10.2.0.1", 999))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert!(!late.load(Ordering::SeqCst));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_rpc_resolver_drives_balance_channel() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();
    registry
        .register(&Endpoint::new("payments", "tcp", "127.0.0.1", 50051))
        .await
        .unwrap();

    let builder = discovery.rpc_builder();
    let target = Target::parse(&format!("{}:///payments", builder.scheme())).unwrap();
    let (_channel, conn) = BalanceChannelConn::balance_channel(16, Box::new(http_endpoint));
    let resolver = builder.build(&target, Arc::new(conn)).await.unwrap();

    registry
        .register(&Endpoint::new("payments", "tcp", "127.0.0.1", 50052))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(resolver.stats().batches_forwarded(), 2);

    resolver.resolve_now();
    resolver.close().await;
    registry.shutdown().await;
}
