/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Error types for the webhook engine.

use cmo_models::models::ValidationError;
use uuid::Uuid;

/// Errors returned by the webhook service and its stores.
///
/// Delivery failures are not represented here: they are recorded on the
/// delivery record and never surface to the caller of `trigger_event`.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Invalid subscription or settings.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A subscription or delivery id that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// The key-value backend failed to load or persist state.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested transition is not allowed from the record's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl WebhookError {
    pub fn subscription_not_found(id: Uuid) -> Self {
        WebhookError::NotFound {
            kind: "subscription",
            id,
        }
    }

    pub fn delivery_not_found(id: Uuid) -> Self {
        WebhookError::NotFound {
            kind: "delivery",
            id,
        }
    }
}

impl From<ValidationError> for WebhookError {
    fn from(e: ValidationError) -> Self {
        WebhookError::Configuration(e.to_string())
    }
}

impl From<std::io::Error> for WebhookError {
    fn from(e: std::io::Error) -> Self {
        WebhookError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
