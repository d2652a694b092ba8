use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::metrics::ACTIVE_REGISTRATIONS_METRIC;
use crate::metrics::KEEPALIVE_LOST_METRIC;
use crate::KeepAliveStream;
use crate::LeaseId;

/// Drains keep-alive acknowledgements until cancelled or until the stream
/// stops. A lost stream is not re-established.
pub(super) async fn renew(
    service: String,
    key: String,
    lease: LeaseId,
    mut acks: KeepAliveStream,
    token: CancellationToken,
) {
    ACTIVE_REGISTRATIONS_METRIC.inc();

    loop {
        let ack = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%key, %lease, "lease renewal cancelled");
                break;
            }
            ack = acks.next() => ack,
        };

        match ack {
            Some(Ok(ack)) => {
                trace!(%key, lease = %ack.id, ttl_secs = ack.ttl_secs, "lease renewed");
            }
            Some(Err(e)) => {
                warn!(%key, %lease, error = %e, "lease keep-alive failed, endpoint will expire");
                KEEPALIVE_LOST_METRIC.with_label_values(&[service.as_str()]).inc();
                break;
            }
            None => {
                warn!(%key, %lease, "lease keep-alive stream closed, endpoint will expire");
                KEEPALIVE_LOST_METRIC.with_label_values(&[service.as_str()]).inc();
                break;
            }
        }
    }

    ACTIVE_REGISTRATIONS_METRIC.dec();
}
