/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Event ingestion endpoint.

use super::{api_error, parse_body, ApiError};
use crate::dispatcher::DispatchSummary;
use crate::service::WebhookService;
use axum::http::StatusCode;
use axum::{extract::State, routing::post, Json, Router};
use cmo_models::models::{EventSource, EventType};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Body of `POST /events`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEventRequest {
    pub event: EventType,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub source: EventSource,
}

pub fn routes() -> Router<WebhookService> {
    Router::new().route("/events", post(trigger_event))
}

/// Dispatches an event and reports which deliveries it created.
///
/// Responds once every first attempt has settled; retries continue in the
/// background, hence 202.
async fn trigger_event(
    State(service): State<WebhookService>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<DispatchSummary>), ApiError> {
    let request: TriggerEventRequest = parse_body(body)?;
    debug!("Received event {} from {}", request.event, request.source);
    let summary = service
        .trigger_event(request.event, request.data, request.source)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}
