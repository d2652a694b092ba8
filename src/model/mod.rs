//! Data shared by the registration and resolution paths.
//!
//! - [`Endpoint`]: what a producer registers
//! - [`Instance`]: what is stored under a storage key and what consumers receive
//! - [`DiscoveryResult`]: the generic resolution shape

mod endpoint;
mod keys;

pub use endpoint::*;
pub use keys::*;
