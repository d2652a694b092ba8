use std::fmt;
use std::sync::Arc;

use tonic::async_trait;
use tracing::info;

use super::pipeline::ResolverTask;
use super::pipeline::StatePublisher;
use super::validate_target;
use super::BoxError;
use crate::constants::ADAPTER_RPC;
use crate::constants::RESOLVER_SCHEME;
use crate::CoordinationStore;
use crate::Error;
use crate::Merger;
use crate::Result;
use crate::WatchConfig;
use crate::WatchStats;

/// Parsed dial target of the form `scheme://authority/endpoint`.
///
/// `endpoint` names the service to resolve; `authority` is kept for callers
/// and ignored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub authority: String,
    pub endpoint: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| Error::InvalidArgument(format!("target {raw:?} has no scheme")))?;
        let (authority, endpoint) = rest.split_once('/').unwrap_or(("", rest));

        if scheme.is_empty() || endpoint.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "target {raw:?} must look like scheme://[authority]/service"
            )));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.endpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// `host:port`
    pub addr: String,
}

/// Complete address list pushed to a transport connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverState {
    pub addresses: Vec<Address>,
}

/// Receiving side of a transport-native resolver.
///
/// Every call carries the full current address list, not a diff.
#[async_trait]
pub trait ClientConn: Send + Sync + 'static {
    async fn update_state(
        &self,
        state: ResolverState,
    ) -> std::result::Result<(), BoxError>;
}

/// Builds resolvers for targets using the [`RESOLVER_SCHEME`] scheme
pub struct RpcResolverBuilder {
    store: Arc<dyn CoordinationStore>,
    config: WatchConfig,
}

impl RpcResolverBuilder {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: WatchConfig,
    ) -> Self {
        Self { store, config }
    }

    pub fn scheme(&self) -> &'static str {
        RESOLVER_SCHEME
    }

    /// Starts watching `target.endpoint` and feeding its addresses to `conn`.
    pub async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn>,
    ) -> Result<RpcResolver> {
        if target.scheme != RESOLVER_SCHEME {
            return Err(Error::InvalidArgument(format!(
                "scheme {:?} is not served by the {RESOLVER_SCHEME} resolver",
                target.scheme
            )));
        }
        validate_target(&target.endpoint)?;

        let task = ResolverTask::start(
            self.store.clone(),
            &target.endpoint,
            &self.config,
            ConnPublisher { conn },
        )
        .await?;
        info!(%target, "transport resolver started");

        Ok(RpcResolver {
            target: target.clone(),
            task,
        })
    }
}

struct ConnPublisher {
    conn: Arc<dyn ClientConn>,
}

#[async_trait]
impl StatePublisher for ConnPublisher {
    fn adapter(&self) -> &'static str {
        ADAPTER_RPC
    }

    async fn publish(
        &self,
        _target: &str,
        merger: &Merger,
    ) -> std::result::Result<(), BoxError> {
        let addresses = merger.addresses().into_iter().map(|addr| Address { addr }).collect();
        self.conn.update_state(ResolverState { addresses }).await
    }
}

/// Transport-native resolver for one target; dropping it stops the watch.
pub struct RpcResolver {
    target: Target,
    task: ResolverTask,
}

impl RpcResolver {
    /// Service name the resolver is bound to
    pub fn target(&self) -> &str {
        &self.target.endpoint
    }

    /// Dial target as parsed at build time
    pub fn dial_target(&self) -> &Target {
        &self.target
    }

    /// Updates are pushed as they happen; there is nothing to refresh.
    pub fn resolve_now(&self) {}

    pub fn stats(&self) -> &WatchStats {
        self.task.stats()
    }

    pub async fn close(&self) {
        self.task.close().await;
        info!(target = %self.target, "transport resolver closed");
    }
}
