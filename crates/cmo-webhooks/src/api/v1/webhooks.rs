/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Webhooks API module.
//!
//! Routes and handlers for managing webhook subscriptions, sending test
//! deliveries and inspecting a subscription's delivery history.

use super::{api_error, parse_body, ApiError};
use crate::service::WebhookService;
use axum::http::StatusCode;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use cmo_models::models::{
    DeliveryRecord, DeliveryStats, EventType, NewWebhookSubscription, UpdateWebhookSubscription,
    WebhookFilter, WebhookSubscription,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

/// A subscription as returned by the API. The secret itself is never echoed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub name: String,
    pub target_url: String,
    /// Whether deliveries are signed.
    pub has_secret: bool,
    pub subscribed_events: Vec<EventType>,
    pub active: bool,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub custom_headers: BTreeMap<String, String>,
    pub filters: Vec<WebhookFilter>,
    pub success_count: u64,
    pub error_count: u64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookSubscription> for WebhookResponse {
    fn from(sub: WebhookSubscription) -> Self {
        Self {
            id: sub.id,
            name: sub.name,
            target_url: sub.target_url,
            has_secret: sub.secret.as_deref().is_some_and(|s| !s.is_empty()),
            subscribed_events: sub.subscribed_events.into_iter().collect(),
            active: sub.active,
            max_retries: sub.max_retries,
            timeout_ms: sub.timeout_ms,
            custom_headers: sub.custom_headers,
            filters: sub.filters,
            success_count: sub.success_count,
            error_count: sub.error_count,
            last_triggered_at: sub.last_triggered_at,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListWebhooksQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDeliveriesQuery {
    /// Maximum number of results, most recent first.
    #[serde(default)]
    pub limit: Option<usize>,
}

// =============================================================================
// Routes
// =============================================================================

/// Creates and returns the router for webhook endpoints.
pub fn routes() -> Router<WebhookService> {
    info!("Setting up webhook routes");
    Router::new()
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route("/webhooks/event-types", get(list_event_types))
        .route(
            "/webhooks/:id",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route("/webhooks/:id/test", post(test_webhook))
        .route("/webhooks/:id/deliveries", get(list_deliveries))
        .route("/webhooks/:id/stats", get(get_stats))
}

// =============================================================================
// Handlers
// =============================================================================

/// Lists webhook subscriptions, newest first.
async fn list_webhooks(
    State(service): State<WebhookService>,
    Query(query): Query<ListWebhooksQuery>,
) -> Result<Json<Vec<WebhookResponse>>, ApiError> {
    let subscriptions = service
        .list_subscriptions(query.active_only)
        .map_err(api_error)?;
    info!("Retrieved {} webhook subscriptions", subscriptions.len());
    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

/// Lists the event types a subscription may register for.
async fn list_event_types() -> Json<Vec<&'static str>> {
    Json(EventType::ALL.iter().map(|e| e.as_str()).collect())
}

/// Creates a webhook subscription.
async fn create_webhook(
    State(service): State<WebhookService>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    let new: NewWebhookSubscription = parse_body(body)?;
    let subscription = service.create_subscription(new).map_err(|e| {
        warn!("Rejected webhook subscription: {}", e);
        api_error(e)
    })?;
    Ok((StatusCode::CREATED, Json(subscription.into())))
}

/// Gets a webhook subscription by ID.
async fn get_webhook(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookResponse>, ApiError> {
    match service.get_subscription(id).map_err(api_error)? {
        Some(subscription) => Ok(Json(subscription.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Webhook subscription not found"})),
        )),
    }
}

/// Applies a partial update to a webhook subscription.
async fn update_webhook(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let update: UpdateWebhookSubscription = parse_body(body)?;
    let subscription = service.update_subscription(id, &update).map_err(api_error)?;
    Ok(Json(subscription.into()))
}

/// Deletes a webhook subscription. Its delivery history is kept.
async fn delete_webhook(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if service.delete_subscription(id).map_err(api_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Webhook subscription not found"})),
        ))
    }
}

/// Sends a test delivery and returns its record.
async fn test_webhook(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRecord>, ApiError> {
    let record = service.test_webhook(id).await.map_err(api_error)?;
    Ok(Json(record))
}

/// Lists the deliveries of one subscription, most recent first.
async fn list_deliveries(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    let records = service
        .list_deliveries(Some(id), query.limit)
        .map_err(api_error)?;
    Ok(Json(records))
}

/// Delivery statistics for one subscription.
async fn get_stats(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryStats>, ApiError> {
    Ok(Json(service.get_stats(Some(id)).map_err(api_error)?))
}
