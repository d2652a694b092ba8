use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tonic::transport::Endpoint;

use super::TlsConfig;
use crate::Error;
use crate::Result;

/// Connection settings for the coordination store.
///
/// Registry and resolvers only consume `request_timeout_in_ms`. The
/// connection fields are for the code that builds a networked
/// [`CoordinationStore`](crate::CoordinationStore): [`dial_endpoints`](Self::dial_endpoints)
/// turns members, timeouts and TLS into tonic endpoints, and
/// [`credentials`](Self::credentials) yields the auth pair for the store client.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store members to dial
    /// Default: ["http://127.0.0.1:2379"]
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Connection establishment timeout in milliseconds
    /// Default: 5000
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_in_ms: u64,

    /// Bound for single-shot store calls (grant, put, delete, get)
    /// Default: 3000
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Basic-auth user name; must be set together with `password`
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            dial_timeout_in_ms: default_dial_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            username: None,
            password: None,
            tls: TlsConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    /// Basic-auth pair, when configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// One tonic endpoint per store member, with the dial and request
    /// timeouts applied and TLS attached when enabled.
    pub fn dial_endpoints(&self) -> Result<Vec<Endpoint>> {
        let tls = self.tls.client_tls_config()?;
        self.endpoints
            .iter()
            .map(|addr| {
                let endpoint = Endpoint::from_shared(addr.clone())
                    .map_err(|e| {
                        Error::Config(ConfigError::Message(format!("invalid store endpoint {addr}: {e}")))
                    })?
                    .connect_timeout(self.dial_timeout())
                    .timeout(self.request_timeout());
                match &tls {
                    Some(tls) => endpoint.tls_config(tls.clone()).map_err(|e| Error::Tls(e.to_string())),
                    None => Ok(endpoint),
                }
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "store.endpoints must contain at least one address".into(),
            )));
        }
        if self.dial_timeout_in_ms == 0 || self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store timeouts must be greater than zero".into(),
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "store.username and store.password must be set together".into(),
            )));
        }
        self.tls.validate()
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".into()]
}
fn default_dial_timeout() -> u64 {
    5000
}
fn default_request_timeout() -> u64 {
    3000
}
