/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Delivery history endpoints.

use super::{api_error, ApiError};
use crate::service::WebhookService;
use axum::http::StatusCode;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use cmo_models::models::{DeliveryRecord, DeliveryStats};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryQuery {
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn routes() -> Router<WebhookService> {
    info!("Setting up delivery routes");
    Router::new()
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/stats", get(get_stats))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/retry", post(retry_delivery))
}

async fn list_deliveries(
    State(service): State<WebhookService>,
    Query(query): Query<DeliveryQuery>,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    let records = service
        .list_deliveries(query.subscription_id, query.limit)
        .map_err(api_error)?;
    Ok(Json(records))
}

async fn get_stats(
    State(service): State<WebhookService>,
    Query(query): Query<DeliveryQuery>,
) -> Result<Json<DeliveryStats>, ApiError> {
    Ok(Json(
        service.get_stats(query.subscription_id).map_err(api_error)?,
    ))
}

async fn get_delivery(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRecord>, ApiError> {
    match service.get_delivery(id).map_err(api_error)? {
        Some(record) => Ok(Json(record)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Delivery not found"})),
        )),
    }
}

/// Redelivers a failed delivery. Responds with the new record.
async fn retry_delivery(
    State(service): State<WebhookService>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRecord>, ApiError> {
    let record = service.retry_delivery(id).await.map_err(api_error)?;
    Ok(Json(record))
}
