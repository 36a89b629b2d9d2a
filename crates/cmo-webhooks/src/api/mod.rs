/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # API Routes Aggregator Module
//!
//! Builds the application router: the versioned webhook API under `/api/v1`
//! plus the health, readiness and metrics endpoints.

pub mod v1;

use crate::metrics;
use crate::service::WebhookService;
use axum::http::{header, StatusCode};
use axum::{response::IntoResponse, routing::get, Router};
use tower_http::trace::TraceLayer;

/// Configures and returns the main application router with all API routes.
///
/// The caller supplies the state with `.with_state(service)`.
pub fn configure_api_routes() -> Router<WebhookService> {
    Router::new()
        .nest("/api/v1", v1::routes())
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

/// Returns 200 "OK" while the process is up.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Returns 200 "Ready" once the service has been constructed.
async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

/// Metrics endpoint handler
///
/// Returns all registered metrics in Prometheus text exposition format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
