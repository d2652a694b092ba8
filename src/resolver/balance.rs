use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tonic::async_trait;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tower::discover::Change;
use tracing::debug;
use tracing::warn;

use super::BoxError;
use super::ClientConn;
use super::ResolverState;

const CHANNEL_CLOSED: &str = "balance channel is closed";

/// Turns a resolved `host:port` into a connectable endpoint
pub type EndpointBuilder =
    Box<dyn Fn(&str) -> std::result::Result<Endpoint, tonic::transport::Error> + Send + Sync>;

/// Plain-text HTTP/2 endpoint for `addr`
pub fn http_endpoint(addr: &str) -> std::result::Result<Endpoint, tonic::transport::Error> {
    Endpoint::from_shared(format!("http://{addr}"))
}

/// [`ClientConn`] feeding a tonic balance channel.
///
/// Each full address list is diffed against the previous one and sent as
/// `Change::Remove` then `Change::Insert` events keyed by `host:port`.
pub struct BalanceChannelConn {
    sender: mpsc::Sender<Change<String, Endpoint>>,
    build: EndpointBuilder,
    current: Mutex<BTreeSet<String>>,
}

impl BalanceChannelConn {
    pub fn new(
        sender: mpsc::Sender<Change<String, Endpoint>>,
        build: EndpointBuilder,
    ) -> Self {
        Self {
            sender,
            build,
            current: Mutex::new(BTreeSet::new()),
        }
    }

    /// Load-balanced channel plus the connection that drives its membership.
    /// Must be called inside a tokio runtime.
    pub fn balance_channel(
        capacity: usize,
        build: EndpointBuilder,
    ) -> (Channel, Self) {
        let (channel, sender) = Channel::balance_channel(capacity);
        (channel, Self::new(sender, build))
    }
}

#[async_trait]
impl ClientConn for BalanceChannelConn {
    async fn update_state(
        &self,
        state: ResolverState,
    ) -> std::result::Result<(), BoxError> {
        let next: BTreeSet<String> = state.addresses.into_iter().map(|a| a.addr).collect();
        let mut current = self.current.lock().await;

        let removed: Vec<String> = current.difference(&next).cloned().collect();
        for addr in removed {
            self.sender
                .send(Change::Remove(addr.clone()))
                .await
                .map_err(|_| CHANNEL_CLOSED)?;
            current.remove(&addr);
            debug!(%addr, "removed endpoint from balance channel");
        }

        let added: Vec<String> = next.difference(&current).cloned().collect();
        for addr in added {
            let endpoint = match (self.build)(&addr) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(%addr, error = %e, "skipping address that is not a valid endpoint");
                    continue;
                }
            };
            self.sender
                .send(Change::Insert(addr.clone(), endpoint))
                .await
                .map_err(|_| CHANNEL_CLOSED)?;
            current.insert(addr.clone());
            debug!(%addr, "inserted endpoint into balance channel");
        }
        Ok(())
    }
}
