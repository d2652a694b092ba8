use super::*;

#[test]
fn test_gather_metrics_renders_registered_counters() {
    DECODE_SKIPPED_METRIC
        .with_label_values(&["metrics-test", "snapshot"])
        .inc();
    KEEPALIVE_LOST_METRIC.with_label_values(&["metrics-test"]).inc();

    let text = gather_metrics();

    assert!(text.contains("discovery_decode_skipped_total"));
    assert!(text.contains(r#"target="metrics-test""#));
    assert!(text.contains("discovery_keepalive_lost_total"));
    assert!(text.contains("discovery_active_registrations"));
}

#[test]
fn test_gather_metrics_is_repeatable() {
    let first = gather_metrics();
    let second = gather_metrics();
    assert!(first.contains("discovery_active_registrations"));
    assert!(second.contains("discovery_active_registrations"));
}
