/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use super::send;
use crate::fixtures::{Receiver, TestFixture};
use axum::http::StatusCode;
use cmo_models::models::{EventSource, EventType};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_list_and_get_deliveries() {
    let fixture = TestFixture::new();
    let ok = Receiver::start(200).await;
    let bad = Receiver::start(500).await;
    let ok_sub = fixture.subscribe(ok.url(), vec![EventType::AlertCreated], 0);
    fixture.subscribe(bad.url(), vec![EventType::AlertCreated], 0);

    for i in 0..3 {
        fixture
            .service
            .trigger_event(EventType::AlertCreated, json!({"n": i}), EventSource::Cmo)
            .await
            .unwrap();
    }

    let (status, all) = send(fixture.create_test_router(), "GET", "/api/v1/deliveries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 6);

    let (_, limited) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/deliveries?subscription_id={}&limit=2", ok_sub.id),
        None,
    )
    .await;
    let limited = limited.as_array().unwrap();
    assert_eq!(limited.len(), 2);
    assert!(limited
        .iter()
        .all(|r| r["subscription_id"] == ok_sub.id.to_string()));

    let id = limited[0]["id"].as_str().unwrap();
    let (status, record) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/deliveries/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "success");
    assert_eq!(record["envelope"]["event"], "alert.created");

    let (status, _) = send(
        fixture.create_test_router(),
        "GET",
        &format!("/api/v1/deliveries/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stats) = send(
        fixture.create_test_router(),
        "GET",
        "/api/v1/deliveries/stats",
        None,
    )
    .await;
    assert_eq!(stats["total"], 6);
    assert_eq!(stats["success"], 3);
    assert_eq!(stats["failed"], 3);
    assert_eq!(stats["success_rate"], 50.0);
}

#[tokio::test]
async fn test_retry_endpoint() {
    let fixture = TestFixture::new();
    let receiver = Receiver::start(500).await;
    fixture.subscribe(receiver.url(), vec![EventType::SystemError], 0);

    let summary = fixture
        .service
        .trigger_event(EventType::SystemError, json!({}), EventSource::System)
        .await
        .unwrap();
    let failed_id = summary.deliveries[0];
    receiver.set_status(200);

    let (status, record) = send(
        fixture.create_test_router(),
        "POST",
        &format!("/api/v1/deliveries/{}/retry", failed_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "success");
    assert_eq!(record["redelivery_of"], failed_id.to_string());

    let new_id = record["id"].as_str().unwrap();
    let (status, body) = send(
        fixture.create_test_router(),
        "POST",
        &format!("/api/v1/deliveries/{}/retry", new_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("failed"));

    let (status, _) = send(
        fixture.create_test_router(),
        "POST",
        &format!("/api/v1/deliveries/{}/retry", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
