use std::time::Duration;

use bytes::Bytes;
use d_engine_discovery::CoordinationStore;
use d_engine_discovery::Endpoint;
use d_engine_discovery::Error;
use d_engine_discovery::Registry;
use d_engine_discovery::DEFAULT_WEIGHT;
use tokio::time::sleep;

use crate::common::TestDiscovery;

#[tokio::test]
async fn test_register_resolve_deregister_not_found() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();
    let resolver = discovery.resolver();

    let endpoint = Endpoint::new("user-service", "tcp", "10.0.0.5", 9090).with_weight(0);
    registry.register(&endpoint).await.unwrap();

    let result = resolver.resolve("user-service").await.unwrap();
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].addr(), "10.0.0.5:9090");
    assert_eq!(result.instances[0].weight, DEFAULT_WEIGHT);

    registry.deregister(&endpoint).await.unwrap();
    assert!(matches!(
        resolver.resolve("user-service").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_services_are_isolated_by_prefix() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();

    registry
        .register(&Endpoint::new("api", "tcp", "10.0.0.1", 80))
        .await
        .unwrap();
    registry
        .register(&Endpoint::new("api-gateway", "tcp", "10.0.0.2", 80))
        .await
        .unwrap();

    let result = discovery.resolver().resolve("api").await.unwrap();
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].address, "10.0.0.1");

    registry.shutdown().await;
}

#[tokio::test]
async fn test_one_bad_record_does_not_hide_the_others() {
    let discovery = TestDiscovery::new(10);
    let registry = discovery.registry();
    registry
        .register(&Endpoint::new("orders", "tcp", "10.0.0.1", 7000))
        .await
        .unwrap();
    discovery
        .store
        .put("orders/10.0.0.2:7000", Bytes::from_static(b"{not json"), None)
        .await
        .unwrap();

    let resolver = discovery.resolver();
    let result = resolver.resolve("orders").await.unwrap();
    assert_eq!(result.instances.len(), 1);
    assert_eq!(resolver.decode_skipped(), 1);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stopped_renewal_expires_endpoint() {
    let discovery = TestDiscovery::new(2);
    let registry = discovery.registry();
    registry
        .register(&Endpoint::new("billing", "tcp", "10.0.0.7", 8443))
        .await
        .unwrap();

    sleep(Duration::from_secs(6)).await;
    assert!(discovery.resolver().resolve("billing").await.is_ok());

    // Process "dies": renewals stop, keys stay until the lease runs out
    registry.shutdown().await;
    sleep(Duration::from_secs(3)).await;
    assert!(matches!(
        discovery.resolver().resolve("billing").await,
        Err(Error::NotFound(_))
    ));
}
