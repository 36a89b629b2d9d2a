/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Event fan-out.
//!
//! `trigger_event` selects the active subscriptions registered for the event
//! type whose filters accept the data, then runs one first attempt per
//! subscription concurrently. It returns once every first attempt has
//! settled; retries continue on the retry worker.

use crate::delivery::{AttemptMode, DeliveryPipeline};
use crate::error::{Result, WebhookError};
use crate::utils::{filters, signing};
use cmo_models::models::{
    DeliveryRecord, DeliveryStatus, EventEnvelope, EventSource, EventType, WebhookSubscription,
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

/// What `trigger_event` did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub event_type: EventType,
    /// Subscriptions that passed event type and filter matching.
    pub matched: usize,
    /// Delivery records created, one per matched subscription.
    pub deliveries: Vec<Uuid>,
}

/// Matches events to subscriptions and runs first attempts.
#[derive(Clone)]
pub struct EventDispatcher {
    pipeline: DeliveryPipeline,
}

impl EventDispatcher {
    pub fn new(pipeline: DeliveryPipeline) -> Self {
        Self { pipeline }
    }

    /// Delivers an event to every matching subscription.
    ///
    /// Failures of individual deliveries are recorded on their records and
    /// never returned here; only a failure to read the subscriptions is.
    pub async fn trigger_event(
        &self,
        event_type: EventType,
        data: Value,
        source: EventSource,
    ) -> Result<DispatchSummary> {
        let candidates = self
            .pipeline
            .dal()
            .webhook_subscriptions()
            .get_matching_subscriptions(event_type)?;
        let matched: Vec<WebhookSubscription> = candidates
            .into_iter()
            .filter(|s| filters::matches(&data, &s.filters))
            .collect();

        if matched.is_empty() {
            debug!("No subscriptions match event {}", event_type);
            return Ok(DispatchSummary {
                event_type,
                matched: 0,
                deliveries: Vec::new(),
            });
        }

        debug!(
            "Dispatching event {} to {} subscription(s)",
            event_type,
            matched.len()
        );

        let branches = matched
            .iter()
            .map(|subscription| self.deliver(subscription, event_type, &data, source));
        let deliveries: Vec<Uuid> = join_all(branches).await.into_iter().flatten().collect();

        Ok(DispatchSummary {
            event_type,
            matched: matched.len(),
            deliveries,
        })
    }

    /// One fan-out branch. Errors are logged so siblings are unaffected.
    async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        event_type: EventType,
        data: &Value,
        source: EventSource,
    ) -> Option<Uuid> {
        let envelope = EventEnvelope::new(event_type, data.clone(), source, subscription.id);
        let record = match self.create_record(subscription, envelope, None) {
            Ok(record) => record,
            Err(e) => {
                error!(
                    "Failed to create delivery for subscription {}: {}",
                    subscription.id, e
                );
                return None;
            }
        };

        if let Err(e) = self
            .pipeline
            .attempt(record.id, subscription, AttemptMode::Regular)
            .await
        {
            error!("Failed to record delivery {}: {}", record.id, e);
        }
        Some(record.id)
    }

    /// Signs `envelope` when the subscription has a secret and stores a
    /// pending record for it.
    fn create_record(
        &self,
        subscription: &WebhookSubscription,
        mut envelope: EventEnvelope,
        redelivery_of: Option<Uuid>,
    ) -> Result<DeliveryRecord> {
        envelope.signature = subscription
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| signing::sign(&envelope, secret));

        let mut record = DeliveryRecord::new(subscription, envelope);
        record.redelivery_of = redelivery_of;
        self.pipeline.dal().webhook_deliveries().create(record)
    }

    /// Sends a synthetic `webhook.test` event to one subscription.
    ///
    /// Exactly one attempt is made regardless of the subscription's event
    /// set, active flag or retry budget. The record is kept in the history,
    /// but the subscription's counters are not touched.
    pub async fn test_webhook(&self, subscription_id: Uuid) -> Result<DeliveryRecord> {
        let subscription = self
            .pipeline
            .dal()
            .webhook_subscriptions()
            .get(subscription_id)?
            .ok_or_else(|| WebhookError::subscription_not_found(subscription_id))?;

        let record = self.create_record(&subscription, EventEnvelope::test(subscription.id), None)?;
        info!(
            "Sending test delivery {} to subscription {}",
            record.id, subscription.id
        );
        self.pipeline
            .attempt(record.id, &subscription, AttemptMode::Test)
            .await
    }

    /// Re-sends the envelope of a failed delivery as a new record.
    ///
    /// The new record carries `redelivery_of` and gets the subscription's
    /// full retry budget; the failed record is left as is.
    pub async fn redeliver(&self, delivery_id: Uuid) -> Result<DeliveryRecord> {
        let dal = self.pipeline.dal();
        let original = dal
            .webhook_deliveries()
            .get(delivery_id)?
            .ok_or_else(|| WebhookError::delivery_not_found(delivery_id))?;

        if original.status != DeliveryStatus::Failed {
            return Err(WebhookError::InvalidState(format!(
                "only failed deliveries can be retried, delivery {} is {}",
                delivery_id, original.status
            )));
        }

        let subscription = dal
            .webhook_subscriptions()
            .get(original.subscription_id)?
            .ok_or_else(|| WebhookError::subscription_not_found(original.subscription_id))?;

        let record = self.create_record(
            &subscription,
            original.envelope.unsigned(),
            Some(original.id),
        )?;
        info!(
            "Redelivering failed delivery {} as {}",
            original.id, record.id
        );
        self.pipeline
            .attempt(record.id, &subscription, AttemptMode::Regular)
            .await
    }
}
