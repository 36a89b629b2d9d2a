/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data models for webhook subscriptions, envelopes and delivery records
pub mod deliveries;
pub mod events;
pub mod webhooks;

pub use deliveries::{DeliveryRecord, DeliveryStats, DeliveryStatus, EventEnvelope};
pub use events::{EventSource, EventType, UnknownEventSource, UnknownEventType};
pub use webhooks::{
    FilterOperator, NewWebhookSubscription, UpdateWebhookSubscription, ValidationError,
    WebhookFilter, WebhookSubscription,
};
