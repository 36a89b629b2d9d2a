/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Delivery models: the outbound envelope and the lifecycle-tracked record of
//! sending it to one subscription.

use crate::models::events::{EventSource, EventType};
use crate::models::webhooks::WebhookSubscription;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a delivery record.
///
/// `Pending -> (Retrying)* -> Success | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Terminal records never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload sent for one event, scoped to one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type tag.
    pub event: EventType,
    /// When the envelope was built (not when the business event happened).
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied payload.
    pub data: serde_json::Value,
    /// Origin of the event.
    pub source: EventSource,
    /// Subscription this envelope was generated for.
    pub webhook_id: Uuid,
    /// Hex HMAC-SHA256 over the envelope serialized without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl EventEnvelope {
    /// Creates an unsigned envelope stamped with the current time.
    pub fn new(
        event: EventType,
        data: serde_json::Value,
        source: EventSource,
        webhook_id: Uuid,
    ) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            data,
            source,
            webhook_id,
            signature: None,
        }
    }

    /// Creates the synthetic envelope used to test a subscription.
    pub fn test(webhook_id: Uuid) -> Self {
        Self::new(
            EventType::WebhookTest,
            serde_json::json!({
                "test": true,
                "message": "This is a test webhook delivery from CMO",
            }),
            EventSource::System,
            webhook_id,
        )
    }

    /// Returns a copy of this envelope without its signature.
    pub fn unsigned(&self) -> Self {
        Self {
            signature: None,
            ..self.clone()
        }
    }
}

/// One attempt lineage for one (subscription, envelope) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Unique identifier for the delivery.
    pub id: Uuid,
    /// The subscription this delivery belongs to. May since have been deleted.
    pub subscription_id: Uuid,
    /// The event type being delivered.
    pub event_type: EventType,
    /// Envelope sent on every attempt.
    pub envelope: EventEnvelope,
    /// Endpoint the delivery targets.
    pub target_url: String,
    /// Current lifecycle status.
    pub status: DeliveryStatus,
    /// Number of HTTP calls made so far.
    pub attempts: u32,
    /// When the most recent call was made.
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// HTTP status of the most recent response.
    #[serde(default)]
    pub response_status: Option<u16>,
    /// Truncated body of the most recent response.
    #[serde(default)]
    pub response_body_excerpt: Option<String>,
    /// Error from the most recent failure.
    #[serde(default)]
    pub error_message: Option<String>,
    /// When the queued retry is expected to run.
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the record reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failed delivery this one re-sends, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redelivery_of: Option<Uuid>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Creates a pending record for `envelope` addressed to `subscription`.
    pub fn new(subscription: &WebhookSubscription, envelope: EventEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            event_type: envelope.event,
            envelope,
            target_url: subscription.target_url.clone(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            response_status: None,
            response_body_excerpt: None,
            error_message: None,
            next_retry_at: None,
            completed_at: None,
            redelivery_of: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Aggregate counts over a set of delivery records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Number of records considered.
    pub total: u64,
    /// Records that ended in success.
    pub success: u64,
    /// Records that exhausted their retry budget.
    pub failed: u64,
    /// Records still pending or retrying.
    pub pending: u64,
    /// Percentage of successful records, 0 when there are none.
    pub success_rate: f64,
}

impl DeliveryStats {
    /// Tallies `records` by status.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a DeliveryRecord>,
    {
        let mut stats = DeliveryStats::default();
        for record in records {
            stats.total += 1;
            match record.status {
                DeliveryStatus::Success => stats.success += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Pending | DeliveryStatus::Retrying => stats.pending += 1,
            }
        }

        if stats.total > 0 {
            let rate = stats.success as f64 * 100.0 / stats.total as f64;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}
