use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Registration-side settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// TTL of the lease backing each registration.
    /// A registered key disappears at most this long after the last renewal.
    /// Default: 10
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_in_secs: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_ttl_in_secs: default_lease_ttl(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lease_ttl_in_secs <= 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "registry.lease_ttl_in_secs must be positive, got {}",
                self.lease_ttl_in_secs
            ))));
        }
        Ok(())
    }
}

fn default_lease_ttl() -> i64 {
    10
}
