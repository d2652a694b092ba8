use std::sync::Arc;

use tonic::async_trait;
use tracing::info;

use super::pipeline::ResolverTask;
use super::pipeline::StatePublisher;
use super::validate_target;
use super::BoxError;
use super::Resolver;
use super::UpdateFn;
use crate::constants::ADAPTER_GENERIC;
use crate::CoordinationStore;
use crate::DiscoveryResult;
use crate::Merger;
use crate::Result;
use crate::WatchConfig;
use crate::WatchStats;

/// Builds streaming resolvers that push every change to a callback
pub struct WatchResolverBuilder {
    store: Arc<dyn CoordinationStore>,
    config: WatchConfig,
}

impl WatchResolverBuilder {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: WatchConfig,
    ) -> Self {
        Self { store, config }
    }

    /// Starts watching `target`.
    ///
    /// `on_update` receives the full instance set after every batch, the
    /// first call carrying the initial snapshot (possibly empty). An `Err`
    /// from the callback is logged and the next batch is delivered anyway.
    pub async fn build<F>(
        &self,
        target: &str,
        on_update: F,
    ) -> Result<WatchResolver>
    where
        F: Fn(DiscoveryResult) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        validate_target(target)?;
        let publisher = CallbackPublisher {
            on_update: Arc::new(on_update),
        };
        let task = ResolverTask::start(self.store.clone(), target, &self.config, publisher).await?;
        info!(%target, "streaming resolver started");

        Ok(WatchResolver {
            target: target.to_string(),
            task,
        })
    }
}

struct CallbackPublisher {
    on_update: UpdateFn,
}

#[async_trait]
impl StatePublisher for CallbackPublisher {
    fn adapter(&self) -> &'static str {
        ADAPTER_GENERIC
    }

    async fn publish(
        &self,
        target: &str,
        merger: &Merger,
    ) -> std::result::Result<(), BoxError> {
        (self.on_update)(DiscoveryResult {
            cacheable: true,
            cache_key: target.to_string(),
            instances: merger.snapshot(),
        })
    }
}

/// Streaming resolver for one target; dropping it stops the watch.
pub struct WatchResolver {
    target: String,
    task: ResolverTask,
}

impl WatchResolver {
    pub fn stats(&self) -> &WatchStats {
        self.task.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_closed()
    }
}

#[async_trait]
impl Resolver for WatchResolver {
    fn target(&self) -> &str {
        &self.target
    }

    /// Results are pushed to the callback; polling yields nothing.
    async fn resolve(
        &self,
        _target: &str,
    ) -> Result<DiscoveryResult> {
        Ok(DiscoveryResult::default())
    }

    async fn close(&self) {
        self.task.close().await;
        info!(target = %self.target, "streaming resolver closed");
    }
}
