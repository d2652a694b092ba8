//! Resolution surfaces.
//!
//! - [`StoreResolver`]: one-shot, a single read per call
//! - [`WatchResolver`]: streaming, pushes every change to a callback
//! - [`RpcResolver`]: streaming, pushes address lists to a [`ClientConn`]
//!   such as [`BalanceChannelConn`]
//!
//! Both streaming adapters run the same pipeline: a [`Watcher`](crate::Watcher)
//! producer task feeding a consumer task that owns the [`Merger`](crate::Merger).

mod balance;
mod pipeline;
mod rpc;
mod store_resolver;
mod watch_resolver;

pub use balance::*;
pub use rpc::*;
pub use store_resolver::*;
pub use watch_resolver::*;

#[cfg(test)]
mod rpc_test;

use std::sync::Arc;

use tonic::async_trait;

use crate::constants::SERVICE_KEY_SEPARATOR;
use crate::DiscoveryResult;
use crate::Error;
use crate::Result;

/// Error type subscribers hand back from a rejected update
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback receiving the full instance set of a target
pub type UpdateFn =
    Arc<dyn Fn(DiscoveryResult) -> std::result::Result<(), BoxError> + Send + Sync>;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Service name this resolver serves
    fn target(&self) -> &str;

    async fn resolve(
        &self,
        target: &str,
    ) -> Result<DiscoveryResult>;

    /// Stops the resolver. Once this returns no further update is delivered.
    async fn close(&self);
}

pub(crate) fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(Error::InvalidArgument("missing target service name".into()));
    }
    if target.contains(SERVICE_KEY_SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "target {target:?} must not contain '{SERVICE_KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}
