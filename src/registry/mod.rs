//! Endpoint registration.
//!
//! Each registered endpoint is one key under a lease of its own. A background
//! task keeps the lease alive for as long as the registration lasts; once
//! renewals stop, for whatever reason, the store expires the key after the
//! lease TTL.
//!
//! `register` and `deregister` on the same storage key are serialised, so the
//! registration on record is always the one whose write the store holds.

mod keep_alive;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::join_task;
use crate::async_task::spawn_task;
use crate::async_task::with_timeout;
use crate::CoordinationStore;
use crate::Endpoint;
use crate::Error;
use crate::LeaseId;
use crate::RegistryConfig;
use crate::Result;
use crate::StoreConfig;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Publishes `endpoint` and keeps it alive until deregistered.
    async fn register(
        &self,
        endpoint: &Endpoint,
    ) -> Result<()>;

    /// Removes a previously registered `endpoint` and stops renewing it.
    async fn deregister(
        &self,
        endpoint: &Endpoint,
    ) -> Result<()>;
}

struct Registration {
    lease: LeaseId,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Registration {
    async fn stop(self) {
        self.token.cancel();
        join_task("lease-keepalive", self.handle).await;
    }
}

/// [`Registry`] backed by a [`CoordinationStore`]
pub struct StoreRegistry {
    store: Arc<dyn CoordinationStore>,
    lease_ttl_secs: i64,
    request_timeout: Duration,
    registrations: Mutex<HashMap<String, Registration>>,
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl StoreRegistry {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        registry: &RegistryConfig,
        store_config: &StoreConfig,
    ) -> Self {
        Self::with_settings(store, registry.lease_ttl_in_secs, store_config.request_timeout())
    }

    pub fn with_settings(
        store: Arc<dyn CoordinationStore>,
        lease_ttl_secs: i64,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lease_ttl_secs,
            request_timeout,
            registrations: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lease currently renewed for `endpoint`, if registered here
    pub fn lease_of(
        &self,
        endpoint: &Endpoint,
    ) -> Option<LeaseId> {
        self.registrations.lock().get(&endpoint.storage_key()).map(|r| r.lease)
    }

    /// Storage keys of every live registration, sorted
    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registrations.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stops every renewal task without deleting any key.
    /// The keys expire with their leases.
    pub async fn shutdown(&self) {
        let registrations: Vec<(String, Registration)> = self.registrations.lock().drain().collect();
        for (key, registration) in registrations {
            registration.stop().await;
            debug!(%key, "renewal stopped on shutdown");
        }
        info!("registry shut down");
    }

    /// Waits for exclusive use of `key` across store calls.
    async fn lock_key(
        &self,
        key: &str,
    ) -> OwnedMutexGuard<()> {
        let lock = self.key_locks.lock().entry(key.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Drops the lock of `key` once nobody holds or waits on it.
    fn release_key(
        &self,
        key: &str,
        guard: OwnedMutexGuard<()>,
    ) {
        drop(guard);
        let mut locks = self.key_locks.lock();
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Releases a lease after a failed registration; failures are only logged.
    async fn revoke_quietly(
        &self,
        lease: LeaseId,
    ) {
        if let Err(e) = with_timeout("revoke", self.request_timeout, self.store.revoke(lease)).await {
            warn!(%lease, error = %e, "could not revoke lease of failed registration");
        }
    }

    /// Grant, put and keep-alive handshake for `key`; the caller holds its lock.
    async fn register_locked(
        &self,
        endpoint: &Endpoint,
        key: &str,
        value: Bytes,
    ) -> Result<()> {
        let lease = with_timeout(
            "grant",
            self.request_timeout,
            self.store.grant(self.lease_ttl_secs),
        )
        .await?;

        if let Err(e) = with_timeout(
            "put",
            self.request_timeout,
            self.store.put(key, value, Some(lease)),
        )
        .await
        {
            self.revoke_quietly(lease).await;
            return Err(e.into());
        }

        let acks = match with_timeout(
            "keep_alive",
            self.request_timeout,
            self.store.keep_alive(lease),
        )
        .await
        {
            Ok(acks) => acks,
            Err(e) => {
                // Revoking also deletes the key bound to the lease
                self.revoke_quietly(lease).await;
                return Err(e.into());
            }
        };

        let token = CancellationToken::new();
        let handle = spawn_task(
            "lease-keepalive",
            keep_alive::renew(endpoint.service_name.clone(), key.to_string(), lease, acks, token.clone()),
        );

        let previous = self.registrations.lock().insert(
            key.to_string(),
            Registration {
                lease,
                token,
                handle,
            },
        );
        if let Some(previous) = previous {
            debug!(%key, old_lease = %previous.lease, "replacing existing registration");
            let old_lease = previous.lease;
            previous.stop().await;
            // The key is bound to `lease` by now; revoking only drops the old lease
            if old_lease != lease {
                self.revoke_quietly(old_lease).await;
            }
        }

        info!(%key, %lease, ttl_secs = self.lease_ttl_secs, "endpoint registered");
        Ok(())
    }

    async fn deregister_locked(
        &self,
        key: &str,
    ) -> Result<()> {
        if !self.registrations.lock().contains_key(key) {
            return Err(Error::NotOperational(format!("{key} is not registered here")));
        }

        with_timeout("delete", self.request_timeout, self.store.delete(key)).await?;

        let registration = self.registrations.lock().remove(key);
        if let Some(registration) = registration {
            registration.stop().await;
        }

        info!(%key, "endpoint deregistered");
        Ok(())
    }
}

#[async_trait]
impl Registry for StoreRegistry {
    async fn register(
        &self,
        endpoint: &Endpoint,
    ) -> Result<()> {
        endpoint.validate_for_register()?;
        let key = endpoint.storage_key();
        let value = Bytes::from(endpoint.to_instance().encode()?);

        let guard = self.lock_key(&key).await;
        let result = self.register_locked(endpoint, &key, value).await;
        self.release_key(&key, guard);
        result
    }

    async fn deregister(
        &self,
        endpoint: &Endpoint,
    ) -> Result<()> {
        if endpoint.service_name.is_empty() {
            return Err(Error::InvalidArgument("missing service name in deregister".into()));
        }

        let key = endpoint.storage_key();
        let guard = self.lock_key(&key).await;
        let result = self.deregister_locked(&key).await;
        self.release_key(&key, guard);
        result
    }
}
