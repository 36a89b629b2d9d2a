/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Delivery attempts and their bookkeeping.
//!
//! [`DeliveryPipeline::attempt`] is the one place where an attempt is
//! counted, executed and recorded. The dispatcher uses it for first
//! attempts and test deliveries, the retry worker for every later attempt.

pub mod executor;
pub mod retry;

pub use executor::{DeliveryExecutor, DeliveryOutcome, FailureKind};
pub use retry::{backoff_delay, BackoffPolicy, QueuedRetry, RetryQueue, RetryScheduler};

use crate::dal::DAL;
use crate::error::{Result, WebhookError};
use crate::metrics;
use crate::utils::notifications::{NoticeSender, WebhookNotice};
use chrono::Utc;
use cmo_models::models::{DeliveryRecord, WebhookSubscription};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How the outcome of an attempt is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMode {
    /// Event deliveries: failures may be retried and subscription counters move.
    Regular,
    /// Connectivity tests: exactly one attempt, counters untouched.
    Test,
}

/// Shared attempt logic for the dispatcher and the retry worker.
#[derive(Clone)]
pub struct DeliveryPipeline {
    dal: DAL,
    executor: DeliveryExecutor,
    queue: Arc<RetryQueue>,
    notices: NoticeSender,
    backoff: BackoffPolicy,
    retry_client_errors: bool,
}

impl DeliveryPipeline {
    pub fn new(
        dal: DAL,
        executor: DeliveryExecutor,
        notices: NoticeSender,
        backoff: BackoffPolicy,
        retry_client_errors: bool,
    ) -> Self {
        Self {
            dal,
            executor,
            queue: Arc::new(RetryQueue::new()),
            notices,
            backoff,
            retry_client_errors,
        }
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    pub fn notices(&self) -> &NoticeSender {
        &self.notices
    }

    /// Runs one attempt for `delivery_id` and records its outcome.
    ///
    /// On failure the record is either queued for retry (status `retrying`)
    /// or closed as `failed`, depending on the remaining budget and `mode`.
    /// If the record was closed while the request was in flight, the stored
    /// record is returned unchanged.
    pub async fn attempt(
        &self,
        delivery_id: Uuid,
        subscription: &WebhookSubscription,
        mode: AttemptMode,
    ) -> Result<DeliveryRecord> {
        let record = self.dal.webhook_deliveries().begin_attempt(delivery_id)?;
        let outcome = self.executor.attempt(&record, subscription).await;

        match self.settle(&record, subscription, &outcome, mode) {
            Err(WebhookError::InvalidState(_)) => {
                debug!("Delivery {} was closed while in flight", delivery_id);
                self.dal
                    .webhook_deliveries()
                    .get(delivery_id)?
                    .ok_or_else(|| WebhookError::delivery_not_found(delivery_id))
            }
            other => other,
        }
    }

    fn settle(
        &self,
        record: &DeliveryRecord,
        subscription: &WebhookSubscription,
        outcome: &DeliveryOutcome,
        mode: AttemptMode,
    ) -> Result<DeliveryRecord> {
        let deliveries = self.dal.webhook_deliveries();
        let event_type = record.event_type.as_str();

        if outcome.success {
            let done = deliveries.mark_success(record.id, outcome)?;
            metrics::record_delivery(event_type, "success", outcome.duration_ms);
            if mode == AttemptMode::Regular {
                self.dal
                    .webhook_subscriptions()
                    .record_success(subscription.id, done.completed_at.unwrap_or_else(Utc::now))?;
            }
            info!(
                "Webhook delivery {} to subscription {} succeeded after {} attempt(s)",
                done.id, subscription.id, done.attempts
            );
            self.notices.send(WebhookNotice::DeliverySucceeded {
                delivery_id: done.id,
                subscription_id: subscription.id,
                attempts: done.attempts,
            });
            return Ok(done);
        }

        if mode == AttemptMode::Regular && self.should_retry(record, subscription, outcome) {
            let delay = self.backoff.delay(record.attempts);
            let next_retry_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            let retrying = deliveries.mark_retrying(record.id, outcome, next_retry_at)?;
            self.queue.enqueue(record.id, subscription.id);
            metrics::record_delivery(event_type, "retrying", outcome.duration_ms);
            debug!(
                "Webhook delivery {} scheduled for retry in {}ms (attempt {} of {})",
                record.id,
                delay.as_millis(),
                record.attempts,
                subscription.max_retries + 1
            );
            self.notices.send(WebhookNotice::DeliveryRetryScheduled {
                delivery_id: record.id,
                subscription_id: subscription.id,
                attempts: record.attempts,
                next_retry_at,
            });
            return Ok(retrying);
        }

        let failed = deliveries.mark_failed(record.id, outcome)?;
        metrics::record_delivery(event_type, "failed", outcome.duration_ms);
        if mode == AttemptMode::Regular {
            self.dal.webhook_subscriptions().record_failure(subscription.id)?;
        }
        warn!(
            "Webhook delivery {} to subscription {} failed after {} attempt(s): {}",
            failed.id,
            subscription.id,
            failed.attempts,
            failed.error_message.as_deref().unwrap_or("unknown error")
        );
        self.notices.send(WebhookNotice::DeliveryFailed {
            delivery_id: failed.id,
            subscription_id: subscription.id,
            attempts: failed.attempts,
            error: failed.error_message.clone(),
        });
        Ok(failed)
    }

    /// `attempts` already includes the call that just failed.
    fn should_retry(
        &self,
        record: &DeliveryRecord,
        subscription: &WebhookSubscription,
        outcome: &DeliveryOutcome,
    ) -> bool {
        if record.attempts > subscription.max_retries {
            return false;
        }
        let client_error = outcome.failure.is_some_and(|f| f.is_client_error());
        self.retry_client_errors || !client_error
    }

    /// Closes a record as failed without attempting it.
    ///
    /// Returns `None` when the record is missing or already closed.
    pub fn abandon(
        &self,
        delivery_id: Uuid,
        subscription_id: Uuid,
        reason: &str,
    ) -> Result<Option<DeliveryRecord>> {
        match self.dal.webhook_deliveries().abandon(delivery_id, reason) {
            Ok(record) => {
                info!("Webhook delivery {} abandoned: {}", delivery_id, reason);
                self.notices.send(WebhookNotice::DeliveryFailed {
                    delivery_id,
                    subscription_id,
                    attempts: record.attempts,
                    error: Some(reason.to_string()),
                });
                Ok(Some(record))
            }
            Err(WebhookError::InvalidState(_)) | Err(WebhookError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
