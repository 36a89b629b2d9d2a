/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Version 1 of the webhook HTTP API.

mod deliveries;
mod events;
mod webhooks;

pub use webhooks::WebhookResponse;

use crate::error::WebhookError;
use crate::service::WebhookService;
use axum::http::StatusCode;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::error;

/// Error half of every handler result: a status and `{"error": "..."}`.
pub type ApiError = (StatusCode, Json<Value>);

pub fn routes() -> Router<WebhookService> {
    Router::new()
        .merge(webhooks::routes())
        .merge(deliveries::routes())
        .merge(events::routes())
}

/// Maps a service error onto its HTTP status.
pub(crate) fn api_error(e: WebhookError) -> ApiError {
    let status = match &e {
        WebhookError::Configuration(_) => StatusCode::BAD_REQUEST,
        WebhookError::NotFound { .. } => StatusCode::NOT_FOUND,
        WebhookError::InvalidState(_) => StatusCode::CONFLICT,
        WebhookError::Storage(_) | WebhookError::Serialization(_) => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}

/// Decodes a JSON body, reporting shape errors as 400.
pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid request body: {}", e) })),
        )
    })
}
