//! Lease-backed service discovery over a revisioned key-value store.
//!
//! Providers publish their endpoints with a [`StoreRegistry`]; each endpoint
//! is one key under a TTL lease that a background task keeps alive.
//! Consumers read the current instance set with a [`StoreResolver`], or
//! subscribe to it with a [`WatchResolver`] (callback) or an [`RpcResolver`]
//! (transport connection, e.g. a tonic balance channel).
//!
//! All store access goes through the [`CoordinationStore`] trait.
//! [`MemoryStore`] implements it in-process.

mod config;
mod constants;
mod errors;
mod metrics;
mod model;
mod registry;
mod resolver;
mod store;
mod utils;
mod watch;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use metrics::gather_metrics;
pub use model::*;
pub use registry::*;
pub use resolver::*;
pub use store::*;
pub(crate) use utils::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
mod test_utils;
