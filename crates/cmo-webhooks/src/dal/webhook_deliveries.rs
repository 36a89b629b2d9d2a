/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for delivery records.
//!
//! Records are kept in insertion order and written through to the backend
//! under the `webhook-deliveries` key before a change becomes visible. Once the history exceeds
//! `max_delivery_history`, the oldest terminal records are evicted first.
//! Terminal records (`success`, `failed`) reject every further transition.

use crate::dal::{read_lock, DAL, DELIVERIES_KEY};
use crate::delivery::executor::DeliveryOutcome;
use crate::error::{Result, WebhookError};
use chrono::{DateTime, Duration, Utc};
use cmo_models::models::{DeliveryRecord, DeliveryStats, DeliveryStatus};
use tracing::debug;
use uuid::Uuid;

/// Data Access Layer for WebhookDelivery operations.
pub struct WebhookDeliveriesDAL<'a> {
    /// Reference to the main DAL instance.
    pub dal: &'a DAL,
}

impl WebhookDeliveriesDAL<'_> {
    /// Stores a new delivery record.
    pub fn create(&self, record: DeliveryRecord) -> Result<DeliveryRecord> {
        let max = self.dal.max_delivery_history;
        self.commit(|records| {
            records.push(record.clone());
            evict(records, max);
            Ok(record)
        })
    }

    /// Gets a delivery record by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<DeliveryRecord>> {
        Ok(read_lock(&self.dal.deliveries)?
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    /// Lists records, most recent first.
    ///
    /// # Arguments
    ///
    /// * `subscription_id` - Restrict to one subscription when set.
    /// * `limit` - Maximum number of records to return.
    pub fn list(&self, subscription_id: Option<Uuid>, limit: Option<usize>) -> Result<Vec<DeliveryRecord>> {
        let records = read_lock(&self.dal.deliveries)?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| subscription_id.map_or(true, |id| r.subscription_id == id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// Non-terminal records belonging to `subscription_id`.
    pub fn list_in_flight(&self, subscription_id: Uuid) -> Result<Vec<DeliveryRecord>> {
        let records = read_lock(&self.dal.deliveries)?;
        Ok(records
            .iter()
            .filter(|r| r.subscription_id == subscription_id && !r.is_terminal())
            .cloned()
            .collect())
    }

    /// Applies `f` to a non-terminal record and persists the result.
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` when the
    /// record is already terminal.
    pub fn update<F>(&self, id: Uuid, f: F) -> Result<DeliveryRecord>
    where
        F: FnOnce(&mut DeliveryRecord),
    {
        self.commit(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| WebhookError::delivery_not_found(id))?;

            if record.is_terminal() {
                return Err(WebhookError::InvalidState(format!(
                    "delivery {} is already {}",
                    id, record.status
                )));
            }

            f(record);
            Ok(record.clone())
        })
    }

    /// Counts the start of an attempt.
    pub fn begin_attempt(&self, id: Uuid) -> Result<DeliveryRecord> {
        self.update(id, |r| {
            r.attempts += 1;
            r.last_attempt_at = Some(Utc::now());
        })
    }

    /// Records a successful attempt and closes the record.
    pub fn mark_success(&self, id: Uuid, outcome: &DeliveryOutcome) -> Result<DeliveryRecord> {
        self.update(id, |r| {
            apply_response(r, outcome);
            r.status = DeliveryStatus::Success;
            r.next_retry_at = None;
            r.completed_at = Some(Utc::now());
        })
    }

    /// Records a failed attempt that will be retried at `next_retry_at`.
    pub fn mark_retrying(
        &self,
        id: Uuid,
        outcome: &DeliveryOutcome,
        next_retry_at: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        self.update(id, |r| {
            apply_response(r, outcome);
            r.status = DeliveryStatus::Retrying;
            r.next_retry_at = Some(next_retry_at);
        })
    }

    /// Records a failed attempt and closes the record.
    pub fn mark_failed(&self, id: Uuid, outcome: &DeliveryOutcome) -> Result<DeliveryRecord> {
        self.update(id, |r| {
            apply_response(r, outcome);
            r.status = DeliveryStatus::Failed;
            r.next_retry_at = None;
            r.completed_at = Some(Utc::now());
        })
    }

    /// Closes a record as failed without another attempt.
    pub fn abandon(&self, id: Uuid, reason: &str) -> Result<DeliveryRecord> {
        self.update(id, |r| {
            r.status = DeliveryStatus::Failed;
            r.error_message = Some(reason.to_string());
            r.next_retry_at = None;
            r.completed_at = Some(Utc::now());
        })
    }

    /// Computes delivery statistics.
    ///
    /// # Arguments
    ///
    /// * `subscription_id` - Restrict to one subscription when set.
    pub fn get_stats(&self, subscription_id: Option<Uuid>) -> Result<DeliveryStats> {
        let records = read_lock(&self.dal.deliveries)?;
        Ok(DeliveryStats::from_records(records.iter().filter(|r| {
            subscription_id.map_or(true, |id| r.subscription_id == id)
        })))
    }

    /// Deletes terminal records created more than `retention_days` ago.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed.
    pub fn cleanup_old(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let expired = |r: &DeliveryRecord| r.is_terminal() && r.created_at < cutoff;

        if !read_lock(&self.dal.deliveries)?.iter().any(expired) {
            return Ok(0);
        }
        self.commit(|records| {
            let before = records.len();
            records.retain(|r| !expired(r));
            Ok(before - records.len())
        })
    }

    fn commit<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<DeliveryRecord>) -> Result<R>,
    {
        self.dal.commit(&self.dal.deliveries, f, |records| {
            self.dal.persist(DELIVERIES_KEY, records)
        })
    }
}

fn apply_response(record: &mut DeliveryRecord, outcome: &DeliveryOutcome) {
    record.response_status = outcome.status_code;
    record.response_body_excerpt = outcome.body_excerpt.clone();
    record.error_message = outcome.error.clone();
}

/// Trims `records` to `max`, dropping terminal records before in-flight ones.
fn evict(records: &mut Vec<DeliveryRecord>, max: usize) {
    while records.len() > max {
        let index = records
            .iter()
            .position(DeliveryRecord::is_terminal)
            .unwrap_or(0);
        let dropped = records.remove(index);
        debug!("Evicted delivery {} from history", dropped.id);
    }
}
