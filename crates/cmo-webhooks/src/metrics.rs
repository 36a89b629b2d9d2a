/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! Prometheus metrics for webhook delivery, exposed at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global Prometheus registry for all webhook metrics
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Delivery attempt counter
/// Labels: event_type, outcome (success, retrying, failed)
pub static DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "cmo_webhook_deliveries_total",
        "Total number of webhook delivery attempts by event type and outcome",
    );
    let counter = CounterVec::new(opts, &["event_type", "outcome"])
        .expect("Failed to create webhook deliveries counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register webhook deliveries counter");
    counter
});

/// Delivery attempt duration histogram
/// Labels: event_type
pub static DELIVERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "cmo_webhook_delivery_duration_seconds",
        "Webhook delivery attempt latency distribution in seconds",
    )
    .buckets(vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ]);
    let histogram = HistogramVec::new(opts, &["event_type"])
        .expect("Failed to create webhook delivery duration histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Failed to register webhook delivery duration histogram");
    histogram
});

/// Number of deliveries waiting in the retry queue
pub static RETRY_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new(
        "cmo_webhook_retry_queue_depth",
        "Number of deliveries waiting in the retry queue",
    );
    let gauge = IntGauge::with_opts(opts).expect("Failed to create retry queue depth gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("Failed to register retry queue depth gauge");
    gauge
});

/// Records one finished attempt.
pub fn record_delivery(event_type: &str, outcome: &str, duration_ms: u64) {
    DELIVERIES_TOTAL
        .with_label_values(&[event_type, outcome])
        .inc();
    DELIVERY_DURATION_SECONDS
        .with_label_values(&[event_type])
        .observe(duration_ms as f64 / 1000.0);
}

pub fn set_retry_queue_depth(depth: usize) {
    RETRY_QUEUE_DEPTH.set(depth as i64);
}

/// Encodes all registered metrics in Prometheus text format
pub fn encode_metrics() -> String {
    Lazy::force(&DELIVERIES_TOTAL);
    Lazy::force(&DELIVERY_DURATION_SECONDS);
    Lazy::force(&RETRY_QUEUE_DEPTH);

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to UTF-8")
}
