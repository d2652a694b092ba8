use crate::constants::SERVICE_KEY_SEPARATOR;

/// Prefix shared by every storage key of `service_name`.
///
/// The trailing separator keeps prefix scans of `api` from matching `api-gateway`.
pub fn service_key_prefix(service_name: &str) -> String {
    format!("{service_name}{SERVICE_KEY_SEPARATOR}")
}

/// Storage key of a single instance: `<service>/<address>:<port>`
pub fn service_key(
    service_name: &str,
    address: &str,
    port: u16,
) -> String {
    format!("{}{address}:{port}", service_key_prefix(service_name))
}
