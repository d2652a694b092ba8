use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::validate_target;
use crate::async_task::with_timeout;
use crate::constants::SOURCE_RESOLVE;
use crate::decode_kv;
use crate::service_key_prefix;
use crate::CoordinationStore;
use crate::DiscoveryResult;
use crate::Error;
use crate::ReadConsistency;
use crate::Result;
use crate::StoreConfig;
use crate::WatchStats;

/// Point-in-time resolution: one linearizable read per call, no watch.
pub struct StoreResolver {
    store: Arc<dyn CoordinationStore>,
    request_timeout: Duration,
    stats: WatchStats,
}

impl StoreResolver {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: &StoreConfig,
    ) -> Self {
        Self::with_timeout(store, config.request_timeout())
    }

    pub fn with_timeout(
        store: Arc<dyn CoordinationStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            request_timeout,
            stats: WatchStats::default(),
        }
    }

    /// Every decodable instance currently registered under `service`, in key order.
    ///
    /// Returns [`Error::NotFound`] when none remain.
    pub async fn resolve(
        &self,
        service: &str,
    ) -> Result<DiscoveryResult> {
        validate_target(service)?;
        let prefix = service_key_prefix(service);
        let response = with_timeout(
            "get_prefix",
            self.request_timeout,
            self.store.get_prefix(&prefix, ReadConsistency::Linearizable),
        )
        .await?;

        let instances: Vec<_> = response
            .kvs
            .iter()
            .filter_map(|kv| decode_kv(service, SOURCE_RESOLVE, kv, &self.stats))
            .map(|(_, instance)| instance)
            .collect();
        debug!(
            %service,
            revision = response.revision,
            found = instances.len(),
            "resolved service"
        );

        if instances.is_empty() {
            return Err(Error::NotFound(service.to_string()));
        }

        Ok(DiscoveryResult {
            cacheable: true,
            cache_key: service.to_string(),
            instances,
        })
    }

    /// Records skipped across every call on this resolver
    pub fn decode_skipped(&self) -> u64 {
        self.stats.decode_skipped()
    }
}
