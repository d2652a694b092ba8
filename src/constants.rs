// -
// Storage layout

/// Separator between the service name and the instance address in a storage key.
/// Also guards prefix scans: `api/` never matches keys of `api-gateway/`.
pub(crate) const SERVICE_KEY_SEPARATOR: char = '/';

// -
// Instance defaults

/// Weight assigned when an instance is stored without one, or with a non-positive one
pub const DEFAULT_WEIGHT: i32 = 10;

// -
// Resolver

/// Scheme under which the transport-native resolver registers itself
pub const RESOLVER_SCHEME: &str = "etcd";

// -
// Metric labels

pub(crate) const SOURCE_SNAPSHOT: &str = "snapshot";
pub(crate) const SOURCE_WATCH: &str = "watch";
pub(crate) const SOURCE_RESOLVE: &str = "resolve";

pub(crate) const ADAPTER_GENERIC: &str = "generic";
pub(crate) const ADAPTER_RPC: &str = "rpc";
