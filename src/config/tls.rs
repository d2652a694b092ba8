use std::fs;
use std::path::Path;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tonic::transport::Certificate;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Identity;

use crate::Error;
use crate::Result;

/// Client-side TLS material for the store connection
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Enables TLS towards the store
    /// Default: false
    #[serde(default)]
    pub enable_tls: bool,

    /// Client certificate chain in PEM format
    #[serde(default)]
    pub certificate_path: String,

    /// Client private key in PEM format
    #[serde(default)]
    pub private_key_path: String,

    /// CA root used to verify the store's certificate
    #[serde(default)]
    pub certificate_authority_root_path: String,

    /// Overrides the server name checked against the store's certificate
    #[serde(default)]
    pub domain_name: Option<String>,
}

impl TlsConfig {
    /// Validates that every configured file exists when TLS is enabled
    pub fn validate(&self) -> Result<()> {
        if !self.enable_tls {
            return Ok(());
        }
        check_file(&self.certificate_path, "client certificate")?;
        check_file(&self.private_key_path, "client private key")?;
        check_file(&self.certificate_authority_root_path, "CA certificate")?;
        Ok(())
    }

    /// Loads the PEM material into a tonic client TLS configuration.
    ///
    /// Returns `Ok(None)` when TLS is disabled.
    pub fn client_tls_config(&self) -> Result<Option<ClientTlsConfig>> {
        if !self.enable_tls {
            return Ok(None);
        }

        let cert = read_pem(&self.certificate_path, "client certificate")?;
        let key = read_pem(&self.private_key_path, "client private key")?;
        let ca = read_pem(&self.certificate_authority_root_path, "CA certificate")?;

        let mut tls = ClientTlsConfig::new()
            .identity(Identity::from_pem(cert, key))
            .ca_certificate(Certificate::from_pem(ca));
        if let Some(domain) = &self.domain_name {
            tls = tls.domain_name(domain.clone());
        }
        Ok(Some(tls))
    }
}

fn check_file(
    path: &str,
    name: &str,
) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path is required when TLS is enabled"
        ))));
    }
    if !Path::new(path).exists() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} file {path} not found"
        ))));
    }
    Ok(())
}

fn read_pem(
    path: &str,
    name: &str,
) -> Result<Vec<u8>> {
    let pem = fs::read(path).map_err(|e| Error::Tls(format!("{name} file {path} is unreadable: {e}")))?;
    if !String::from_utf8_lossy(&pem).contains("-----BEGIN") {
        return Err(Error::Tls(format!("{name} file {path} is not PEM encoded")));
    }
    Ok(pem)
}
