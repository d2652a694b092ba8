//! Configuration management for the discovery layer.
//!
//! Loading order, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. File named by `DISCOVERY_CONFIG_PATH`, or passed to
//!    [`DiscoveryConfig::with_override_config`]
//! 3. Environment variables prefixed `DISCOVERY__` (e.g.
//!    `DISCOVERY__REGISTRY__LEASE_TTL_IN_SECS=30`)
//!
//! Loading never validates; call [`DiscoveryConfig::validate`] once the final
//! configuration is assembled.

mod registry;
mod store;
mod tls;
mod watch;

pub use registry::*;
pub use store::*;
pub use tls::*;
pub use watch::*;

#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "DISCOVERY";
const CONFIG_PATH_ENV: &str = "DISCOVERY_CONFIG_PATH";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DiscoveryConfig {
    /// Coordination store connection settings (passthrough to the store transport)
    #[serde(default)]
    pub store: StoreConfig,
    /// Registration side: lease TTL
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Resolution side: snapshot read bound, batch channel sizing
    #[serde(default)]
    pub watch: WatchConfig,
}

impl DiscoveryConfig {
    /// Defaults, then the optional file in `DISCOVERY_CONFIG_PATH`, then
    /// `DISCOVERY__*` environment variables.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers the file at `path` and the environment over `self`.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.registry.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("store.endpoints")
}
