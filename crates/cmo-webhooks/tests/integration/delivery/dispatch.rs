/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{Receiver, TestFixture};
use cmo_models::models::{
    DeliveryStatus, EventSource, EventType, FilterOperator, NewWebhookSubscription,
    UpdateWebhookSubscription, WebhookFilter,
};
use serde_json::{json, Value};

#[tokio::test]
async fn test_single_attempt_success_end_to_end() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    let sub = fixture.subscribe(receiver.url(), vec![EventType::AlertCreated], 0);

    let summary = fixture
        .service
        .trigger_event(
            EventType::AlertCreated,
            json!({"alert_id": "A-1"}),
            EventSource::Cmo,
        )
        .await
        .unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.deliveries.len(), 1);

    let records = fixture.service.list_deliveries(Some(sub.id), None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeliveryStatus::Success);
    assert_eq!(records[0].attempts, 1);
    assert_eq!(records[0].response_status, Some(200));
    assert!(records[0].completed_at.is_some());
    assert_eq!(receiver.hits(), 1);

    let sub = fixture.service.get_subscription(sub.id).unwrap().unwrap();
    assert_eq!(sub.success_count, 1);
    assert_eq!(sub.error_count, 0);
    assert!(sub.last_triggered_at.is_some());
}

#[tokio::test]
async fn test_request_carries_delivery_headers_and_envelope() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    let sub = fixture
        .service
        .create_subscription(
            NewWebhookSubscription::new(receiver.url(), vec![EventType::TransitDelayed])
                .with_header("X-Tenant", "north")
                .with_header("User-Agent", "spoofed"),
        )
        .unwrap();

    let summary = fixture
        .service
        .trigger_event(
            EventType::TransitDelayed,
            json!({"transit_id": 7, "delay_minutes": 45}),
            EventSource::External,
        )
        .await
        .unwrap();

    let requests = receiver.requests();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["user-agent"], "CMO-Webhooks/1.0");
    assert_eq!(headers["x-webhook-event"], "transit.delayed");
    assert_eq!(
        headers["x-webhook-delivery"].to_str().unwrap(),
        summary.deliveries[0].to_string()
    );
    assert_eq!(headers["x-tenant"], "north");
    assert!(headers.get("x-webhook-signature").is_none());

    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["event"], "transit.delayed");
    assert_eq!(body["source"], "external");
    assert_eq!(body["webhook_id"], sub.id.to_string());
    assert_eq!(body["data"]["delay_minutes"], 45);
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_fan_out_isolates_slow_subscriber() {
    let fixture = TestFixture::new();
    let fast = Receiver::start(200).await;
    let slow = Receiver::slow(200, 1_000).await;

    let fast_sub = fixture.subscribe(fast.url(), vec![EventType::SystemError], 3);
    let slow_sub = fixture
        .service
        .create_subscription(
            NewWebhookSubscription::new(slow.url(), vec![EventType::SystemError])
                .with_max_retries(3)
                .with_timeout_ms(100),
        )
        .unwrap();

    fixture
        .service
        .trigger_event(EventType::SystemError, json!({"code": 500}), EventSource::System)
        .await
        .unwrap();

    let fast_record = &fixture.service.list_deliveries(Some(fast_sub.id), None).unwrap()[0];
    let slow_record = &fixture.service.list_deliveries(Some(slow_sub.id), None).unwrap()[0];

    assert_eq!(fast_record.status, DeliveryStatus::Success);
    assert_eq!(slow_record.status, DeliveryStatus::Retrying);
    assert!(slow_record.error_message.as_deref().unwrap().contains("timed out"));
    assert!(slow_record.next_retry_at.is_some());
}

#[tokio::test]
async fn test_filters_select_subscribers() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    fixture
        .service
        .create_subscription(
            NewWebhookSubscription::new(receiver.url(), vec![EventType::AlertCreated]).with_filter(
                WebhookFilter::new("data.priority", FilterOperator::Eq, "critical"),
            ),
        )
        .unwrap();

    let low = fixture
        .service
        .trigger_event(EventType::AlertCreated, json!({"priority": "low"}), EventSource::Cmo)
        .await
        .unwrap();
    assert_eq!(low.matched, 0);
    assert_eq!(receiver.hits(), 0);

    let critical = fixture
        .service
        .trigger_event(
            EventType::AlertCreated,
            json!({"priority": "critical"}),
            EventSource::Cmo,
        )
        .await
        .unwrap();
    assert_eq!(critical.matched, 1);
    assert_eq!(receiver.hits(), 1);
}

#[tokio::test]
async fn test_inactive_and_unsubscribed_are_skipped() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    let inactive = fixture.subscribe(receiver.url(), vec![EventType::UserLogin], 0);
    fixture
        .service
        .update_subscription(
            inactive.id,
            &UpdateWebhookSubscription {
                active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    fixture.subscribe(receiver.url(), vec![EventType::DataExport], 0);

    let summary = fixture
        .service
        .trigger_event(EventType::UserLogin, json!({"user": "ana"}), EventSource::Cmo)
        .await
        .unwrap();

    assert_eq!(summary.matched, 0);
    assert!(summary.deliveries.is_empty());
    assert_eq!(receiver.hits(), 0);
    assert!(fixture.service.list_deliveries(None, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_sends_single_test_event() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    let sub = fixture.subscribe(receiver.url(), vec![EventType::AlertResolved], 3);

    let record = fixture.service.test_webhook(sub.id).await.unwrap();

    assert_eq!(record.event_type, EventType::WebhookTest);
    assert_eq!(record.status, DeliveryStatus::Success);
    let body: Value = serde_json::from_str(&receiver.requests()[0].body).unwrap();
    assert_eq!(body["event"], "webhook.test");
    assert_eq!(body["source"], "system");
    assert_eq!(body["data"]["test"], true);

    let sub = fixture.service.get_subscription(sub.id).unwrap().unwrap();
    assert_eq!(sub.success_count, 0);
}

#[tokio::test]
async fn test_webhook_failure_is_not_retried() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(503).await;
    let sub = fixture.subscribe(receiver.url(), vec![EventType::AlertResolved], 3);

    let record = fixture.service.test_webhook(sub.id).await.unwrap();

    assert_eq!(record.status, DeliveryStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.response_status, Some(503));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(receiver.hits(), 1);
    assert_eq!(
        fixture.service.get_subscription(sub.id).unwrap().unwrap().error_count,
        0
    );
}

#[tokio::test]
async fn test_stats_over_mixed_outcomes() {
    let fixture = TestFixture::new();
    let ok = Receiver::start(200).await;
    let bad = Receiver::start(500).await;
    let ok_sub = fixture.subscribe(ok.url(), vec![EventType::AlertCreated], 0);
    fixture.subscribe(bad.url(), vec![EventType::ThresholdExceeded], 0);

    for i in 0..7 {
        fixture
            .service
            .trigger_event(EventType::AlertCreated, json!({"n": i}), EventSource::Cmo)
            .await
            .unwrap();
    }
    for i in 0..3 {
        fixture
            .service
            .trigger_event(EventType::ThresholdExceeded, json!({"n": i}), EventSource::Cmo)
            .await
            .unwrap();
    }

    let stats = fixture.service.get_stats(None).unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.success, 7);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.success_rate, 70.0);

    let ok_stats = fixture.service.get_stats(Some(ok_sub.id)).unwrap();
    assert_eq!(ok_stats.total, 7);
    assert_eq!(ok_stats.success_rate, 100.0);
}

#[tokio::test]
async fn test_emit_dispatches_in_background() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    fixture.subscribe(receiver.url(), vec![EventType::PrecintoViolated], 0);

    fixture
        .service
        .emit_async(
            EventType::PrecintoViolated,
            json!({"precinto": "P-9"}),
            EventSource::Cmo,
        )
        .await
        .unwrap();
    fixture
        .service
        .emit(EventType::PrecintoViolated, json!({"precinto": "P-10"}), EventSource::Cmo);

    let delivered = crate::fixtures::wait_until(std::time::Duration::from_secs(5), || {
        receiver.hits() == 2
    })
    .await;
    assert!(delivered);
}

#[tokio::test]
async fn test_emitted_events_do_not_wait_on_slow_subscribers() {
    let fixture = TestFixture::new();
    let slow = Receiver::slow(200, 1_500).await;
    let fast = Receiver::start(200).await;
    fixture.subscribe(slow.url(), vec![EventType::AlertCreated], 0);
    fixture.subscribe(fast.url(), vec![EventType::UserLogin], 0);

    let started = std::time::Instant::now();
    fixture
        .service
        .emit_async(EventType::AlertCreated, json!({}), EventSource::Cmo)
        .await
        .unwrap();
    fixture
        .service
        .emit_async(EventType::UserLogin, json!({}), EventSource::Cmo)
        .await
        .unwrap();

    let delivered = crate::fixtures::wait_until(std::time::Duration::from_secs(5), || {
        fast.hits() == 1
    })
    .await;
    assert!(delivered);
    assert!(started.elapsed() < std::time::Duration::from_millis(1_000));
}

#[tokio::test]
async fn test_probe_on_create_sends_test_event() {
    let mut settings = crate::fixtures::test_settings();
    settings.webhooks.probe_on_create = true;
    let fixture = TestFixture::with_settings(settings);
    let receiver = Receiver::start(200).await;

    let sub = fixture.subscribe(receiver.url(), vec![EventType::AlertCreated], 0);

    let probed = crate::fixtures::wait_until(std::time::Duration::from_secs(5), || {
        receiver.hits() == 1
    })
    .await;
    assert!(probed);
    let body: Value = serde_json::from_str(&receiver.requests()[0].body).unwrap();
    assert_eq!(body["event"], "webhook.test");
    assert_eq!(body["webhook_id"], sub.id.to_string());
}

#[tokio::test]
async fn test_endless_response_body_is_read_only_up_to_excerpt() {
    let mut settings = crate::fixtures::test_settings();
    settings.webhooks.response_excerpt_limit = 100;
    let fixture = TestFixture::with_settings(settings);
    let receiver = Receiver::endless().await;
    let sub = fixture
        .service
        .create_subscription(
            NewWebhookSubscription::new(receiver.url(), vec![EventType::AlertCreated])
                .with_max_retries(0)
                .with_timeout_ms(1_500),
        )
        .unwrap();

    let started = std::time::Instant::now();
    let summary = fixture
        .service
        .trigger_event(EventType::AlertCreated, json!({}), EventSource::Cmo)
        .await
        .unwrap();
    assert!(started.elapsed() < std::time::Duration::from_millis(1_500));

    let record = fixture
        .service
        .get_delivery(summary.deliveries[0])
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Success);
    assert_eq!(record.response_status, Some(200));
    assert!(record.error_message.is_none());
    let excerpt = record.response_body_excerpt.unwrap();
    assert_eq!(excerpt, "x".repeat(100));

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(receiver.streamed() < 8 * 1024 * 1024);

    let sub = fixture.service.get_subscription(sub.id).unwrap().unwrap();
    assert_eq!(sub.success_count, 1);
}
