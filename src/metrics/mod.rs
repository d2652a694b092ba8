use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref DECODE_SKIPPED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "discovery_decode_skipped_total",
            "Stored instances skipped because their payload could not be decoded"
        ),
        &["target", "source"]
    )
    .expect("metric can not be created");

    pub static ref BATCHES_PUBLISHED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "discovery_batches_published_total",
            "Merged results pushed to a resolver subscriber"
        ),
        &["target", "adapter"]
    )
    .expect("metric can not be created");

    pub static ref SUBSCRIBER_ERRORS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "discovery_subscriber_errors_total",
            "Resolver subscriber callbacks that returned an error"
        ),
        &["target", "adapter"]
    )
    .expect("metric can not be created");

    pub static ref KEEPALIVE_LOST_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "discovery_keepalive_lost_total",
            "Registrations whose lease keep-alive stream ended unexpectedly"
        ),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_REGISTRATIONS_METRIC: IntGauge = IntGauge::new(
        "discovery_active_registrations",
        "Registrations currently renewing their lease"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(DECODE_SKIPPED_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(BATCHES_PUBLISHED_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(SUBSCRIBER_ERRORS_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(KEEPALIVE_LOST_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(ACTIVE_REGISTRATIONS_METRIC.clone()))
            .expect("collector can be registered");
    });
}

/// Renders every discovery metric in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod metrics_test;
