use std::sync::Arc;
use std::time::Duration;

use d_engine_discovery::CoordinationStore;
use d_engine_discovery::DiscoveryConfig;
use d_engine_discovery::DiscoveryResult;
use d_engine_discovery::MemoryStore;
use d_engine_discovery::RpcResolverBuilder;
use d_engine_discovery::StoreRegistry;
use d_engine_discovery::StoreResolver;
use d_engine_discovery::WatchResolverBuilder;
use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(3);

/// One in-process store plus every discovery component wired against it
pub struct TestDiscovery {
    pub store: MemoryStore,
    pub config: DiscoveryConfig,
}

impl TestDiscovery {
    pub fn new(lease_ttl_in_secs: i64) -> Self {
        let mut config = DiscoveryConfig::default();
        config.registry.lease_ttl_in_secs = lease_ttl_in_secs;
        Self {
            store: MemoryStore::new(),
            config: config.validate().expect("test config is valid"),
        }
    }

    pub fn handle(&self) -> Arc<dyn CoordinationStore> {
        Arc::new(self.store.clone())
    }

    pub fn registry(&self) -> StoreRegistry {
        StoreRegistry::new(self.handle(), &self.config.registry, &self.config.store)
    }

    pub fn resolver(&self) -> StoreResolver {
        StoreResolver::new(self.handle(), &self.config.store)
    }

    pub fn watch_builder(&self) -> WatchResolverBuilder {
        WatchResolverBuilder::new(self.handle(), self.config.watch.clone())
    }

    pub fn rpc_builder(&self) -> RpcResolverBuilder {
        RpcResolverBuilder::new(self.handle(), self.config.watch.clone())
    }
}

/// Shared log of results pushed to a streaming resolver callback
#[derive(Clone, Default)]
pub struct Updates(Arc<Mutex<Vec<DiscoveryResult>>>);

impl Updates {
    pub fn push(
        &self,
        result: DiscoveryResult,
    ) {
        self.0.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn get(
        &self,
        index: usize,
    ) -> DiscoveryResult {
        self.0.lock()[index].clone()
    }

    pub async fn wait_for(
        &self,
        count: usize,
    ) -> DiscoveryResult {
        timeout(WAIT, async {
            while self.len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timeout waiting for resolver update");
        self.get(count - 1)
    }
}
