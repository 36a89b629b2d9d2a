/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use super::send;
use crate::fixtures::{Receiver, TestFixture};
use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

fn create_body(url: &str) -> Value {
    json!({
        "name": "Ops alerts",
        "target_url": url,
        "secret": "s3cret",
        "subscribed_events": ["alert.created", "alert.resolved"],
        "max_retries": 2,
        "custom_headers": {"X-Tenant": "north"},
        "filters": [{"field": "data.priority", "operator": "=", "value": "critical"}]
    })
}

#[tokio::test]
async fn test_create_and_get_webhook() {
    let fixture = TestFixture::new();

    let (status, created) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(create_body("https://example.test/hook")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Ops alerts");
    assert_eq!(created["has_secret"], true);
    assert!(created.get("secret").is_none());
    assert_eq!(created["max_retries"], 2);
    assert_eq!(created["timeout_ms"], 2_000);
    assert_eq!(created["active"], true);
    assert_eq!(
        created["subscribed_events"],
        json!(["alert.created", "alert.resolved"])
    );

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/webhooks/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_webhook_validation_errors() {
    let fixture = TestFixture::new();

    let (status, body) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(json!({"target_url": "https://example.test/hook", "subscribed_events": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("event type"));

    let (status, _) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(json!({"target_url": "https://example.test/hook", "subscribed_events": ["alert.exploded"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(json!({"target_url": "", "subscribed_events": ["alert.created"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fixture.service.list_subscriptions(false).unwrap().is_empty());
}

#[tokio::test]
async fn test_list_webhooks_active_only() {
    let fixture = TestFixture::new();
    let (_, first) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(create_body("https://one.example.test/hook")),
    )
    .await;
    send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(create_body("https://two.example.test/hook")),
    )
    .await;

    let (status, _) = send(
        fixture.create_test_router(),
        "PUT",
        &format!("/api/v1/webhooks/{}", first["id"].as_str().unwrap()),
        Some(json!({"active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = send(fixture.create_test_router(), "GET", "/api/v1/webhooks", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, active) = send(
        fixture.create_test_router(),
        "GET",
        "/api/v1/webhooks?active_only=true",
        None,
    )
    .await;
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["target_url"], "https://two.example.test/hook");
}

#[tokio::test]
async fn test_update_webhook_partial() {
    let fixture = TestFixture::new();
    let (_, created) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(create_body("https://example.test/hook")),
    )
    .await;
    let uri = format!("/api/v1/webhooks/{}", created["id"].as_str().unwrap());

    let (status, updated) = send(
        fixture.create_test_router(),
        "PUT",
        &uri,
        Some(json!({"name": "Renamed", "secret": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Renamed");
    assert_eq!(updated["has_secret"], false);
    assert_eq!(updated["target_url"], "https://example.test/hook");
    assert_eq!(updated["max_retries"], 2);

    let (status, _) = send(
        fixture.create_test_router(),
        "PUT",
        &uri,
        Some(json!({"timeout_ms": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        fixture.create_test_router(),
        "PUT",
        &format!("/api/v1/webhooks/{}", Uuid::new_v4()),
        Some(json!({"name": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_webhook() {
    let fixture = TestFixture::new();
    let (_, created) = send(
        fixture.create_test_router(),
        "POST",
        "/api/v1/webhooks",
        Some(create_body("https://example.test/hook")),
    )
    .await;
    let uri = format!("/api/v1/webhooks/{}", created["id"].as_str().unwrap());

    let (status, body) = send(fixture.create_test_router(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(fixture.create_test_router(), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(fixture.create_test_router(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_event_types() {
    let fixture = TestFixture::new();
    let (status, body) = send(
        fixture.create_test_router(),
        "GET",
        "/api/v1/webhooks/event-types",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let types = body.as_array().unwrap();
    assert_eq!(types.len(), 9);
    assert!(types.contains(&json!("precinto.violated")));
    assert!(types.contains(&json!("webhook.test")));
}

#[tokio::test]
async fn test_webhook_test_endpoint_and_history() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(200).await;
    let sub = fixture.subscribe(receiver.url(), vec![cmo_models::models::EventType::AlertCreated], 0);

    let (status, record) = send(
        fixture.create_test_router(),
        "POST",
        &format!("/api/v1/webhooks/{}/test", sub.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "success");
    assert_eq!(record["event_type"], "webhook.test");

    let (status, history) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/webhooks/{}/deliveries?limit=10", sub.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, stats) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/webhooks/{}/stats", sub.id),
        None,
    )
    .await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["success_rate"], 100.0);

    let (status, _) = send(
        fixture.create_test_router(),
        "POST",
        &format!("/api/v1/webhooks/{}/test", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
