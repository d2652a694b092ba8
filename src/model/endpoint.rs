use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::service_key;
use crate::constants::DEFAULT_WEIGHT;
use crate::constants::SERVICE_KEY_SEPARATOR;
use crate::DecodeError;
use crate::Error;
use crate::Result;

/// Registration-time description of one network endpoint.
///
/// Immutable once registered; registering the same address again overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    pub service_name: String,
    pub network: String,
    pub address: String,
    pub port: u16,
    pub weight: i32,
    pub tags: HashMap<String, String>,
}

impl Endpoint {
    pub fn new(
        service_name: impl Into<String>,
        network: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            network: network.into(),
            address: address.into(),
            port,
            weight: DEFAULT_WEIGHT,
            tags: HashMap::new(),
        }
    }

    pub fn with_weight(
        mut self,
        weight: i32,
    ) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_tag(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Storage key this endpoint is written under
    pub fn storage_key(&self) -> String {
        service_key(&self.service_name, &self.address, self.port)
    }

    /// Stored form of this endpoint
    pub fn to_instance(&self) -> Instance {
        Instance {
            network: self.network.clone(),
            address: self.address.clone(),
            port: self.port,
            weight: self.weight,
            tags: self.tags.clone(),
        }
    }

    /// Checks the fields required before anything is written to the store
    pub(crate) fn validate_for_register(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(Error::InvalidArgument("missing service name in register".into()));
        }
        if self.service_name.contains(SERVICE_KEY_SEPARATOR) {
            return Err(Error::InvalidArgument(format!(
                "service name {:?} must not contain '{SERVICE_KEY_SEPARATOR}'",
                self.service_name
            )));
        }
        if self.network.is_empty() {
            return Err(Error::InvalidArgument("missing network in register".into()));
        }
        if self.address.is_empty() {
            return Err(Error::InvalidArgument("missing address in register".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidArgument("missing port in register".into()));
        }
        Ok(())
    }
}

/// One live endpoint as stored in, and resolved from, the coordination store.
///
/// This is also the canonical JSON payload:
/// `{"network", "address", "port", "weight", "tags"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub network: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Instance {
    /// `host:port` form handed to transports
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a stored payload, clamping a missing or non-positive weight
    /// to [`DEFAULT_WEIGHT`].
    pub(crate) fn decode(
        key: &str,
        value: &[u8],
    ) -> std::result::Result<Self, DecodeError> {
        let mut instance: Instance =
            serde_json::from_slice(value).map_err(|source| DecodeError::Malformed {
                key: key.to_string(),
                source,
            })?;
        if instance.weight <= 0 {
            instance.weight = DEFAULT_WEIGHT;
        }
        Ok(instance)
    }
}

/// Externally visible materialization of a service's live instances
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryResult {
    pub cacheable: bool,
    pub cache_key: String,
    pub instances: Vec<Instance>,
}
