/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Retry queue and its worker.
//!
//! Failed deliveries with budget left are queued in FIFO order. A single
//! worker pops the head, waits out the backoff delay for the record's
//! attempt count, re-checks the subscription and attempts again.

use crate::delivery::{AttemptMode, DeliveryPipeline};
use crate::error::Result;
use crate::metrics;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Returns `min(base * 2^(attempts - 1), max)` in milliseconds.
///
/// `attempts` is the number of calls already made, so the first retry waits
/// `base`. Overflow saturates at `max`.
pub fn backoff_delay(attempts: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponent = attempts.saturating_sub(1);
    2u64.checked_pow(exponent)
        .and_then(|factor| base_ms.checked_mul(factor))
        .map_or(max_ms, |delay| delay.min(max_ms))
}

/// Exponential backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before the retry that follows `attempts` calls.
    pub fn delay(&self, attempts: u32) -> Duration {
        Duration::from_millis(backoff_delay(
            attempts,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// A delivery waiting for its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedRetry {
    pub delivery_id: Uuid,
    pub subscription_id: Uuid,
}

/// FIFO of deliveries awaiting retry.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: Mutex<VecDeque<QueuedRetry>>,
    notify: Notify,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<QueuedRetry>> {
        // A VecDeque cannot be left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a delivery and wakes the worker.
    pub fn enqueue(&self, delivery_id: Uuid, subscription_id: Uuid) {
        let depth = {
            let mut entries = self.entries();
            entries.push_back(QueuedRetry {
                delivery_id,
                subscription_id,
            });
            entries.len()
        };
        metrics::set_retry_queue_depth(depth);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<QueuedRetry> {
        let mut entries = self.entries();
        let entry = entries.pop_front();
        metrics::set_retry_queue_depth(entries.len());
        entry
    }

    /// Waits until an entry is available and removes it.
    pub async fn next(&self) -> QueuedRetry {
        loop {
            if let Some(entry) = self.pop() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    /// Drops every queued entry of `subscription_id`, returning their delivery ids.
    pub fn remove_subscription(&self, subscription_id: Uuid) -> Vec<Uuid> {
        let mut entries = self.entries();
        let removed: Vec<Uuid> = entries
            .iter()
            .filter(|e| e.subscription_id == subscription_id)
            .map(|e| e.delivery_id)
            .collect();
        entries.retain(|e| e.subscription_id != subscription_id);
        metrics::set_retry_queue_depth(entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Owns the retry worker task.
pub struct RetryScheduler {
    pipeline: DeliveryPipeline,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    /// Spawns the worker on the current runtime.
    pub fn start(pipeline: DeliveryPipeline) -> Self {
        info!(
            "Starting webhook retry worker (base: {}ms, max: {}ms)",
            pipeline.backoff().base_delay_ms,
            pipeline.backoff().max_delay_ms
        );
        let worker = tokio::spawn(run_worker(pipeline.clone()));

        Self {
            pipeline,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn enqueue(&self, delivery_id: Uuid, subscription_id: Uuid) {
        self.pipeline.queue().enqueue(delivery_id, subscription_id);
    }

    /// Stops all pending work for a deleted subscription.
    ///
    /// Queued entries are dropped and every non-terminal record of the
    /// subscription is marked failed. An attempt already in flight finishes,
    /// but its outcome can no longer change the closed record.
    ///
    /// # Returns
    ///
    /// Returns the number of records closed.
    pub fn cancel_subscription(&self, subscription_id: Uuid) -> Result<usize> {
        let dequeued = self.pipeline.queue().remove_subscription(subscription_id);
        let in_flight = self
            .pipeline
            .dal()
            .webhook_deliveries()
            .list_in_flight(subscription_id)?;

        let mut closed = 0;
        for record in in_flight {
            if self
                .pipeline
                .abandon(record.id, subscription_id, "subscription deleted")?
                .is_some()
            {
                closed += 1;
            }
        }

        info!(
            "Cancelled retries for subscription {} ({} dequeued, {} closed)",
            subscription_id,
            dequeued.len(),
            closed
        );
        Ok(closed)
    }

    pub fn queue_len(&self) -> usize {
        self.pipeline.queue().len()
    }

    /// Aborts the worker. Queued entries stay queued.
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Webhook retry worker stopped");
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(pipeline: DeliveryPipeline) {
    loop {
        let entry = pipeline.queue().next().await;
        if let Err(e) = process_retry(&pipeline, entry).await {
            error!(
                "Failed to process retry for delivery {}: {}",
                entry.delivery_id, e
            );
        }
    }
}

async fn process_retry(pipeline: &DeliveryPipeline, entry: QueuedRetry) -> Result<()> {
    let record = match pipeline.dal().webhook_deliveries().get(entry.delivery_id)? {
        Some(record) if !record.is_terminal() => record,
        _ => {
            debug!("Skipping retry for closed delivery {}", entry.delivery_id);
            return Ok(());
        }
    };

    tokio::time::sleep(pipeline.backoff().delay(record.attempts)).await;

    match pipeline
        .dal()
        .webhook_subscriptions()
        .get(entry.subscription_id)?
    {
        Some(subscription) if subscription.active && record.attempts > subscription.max_retries => {
            let reason = format!(
                "retry budget exhausted after {} attempt(s)",
                record.attempts
            );
            if pipeline
                .abandon(entry.delivery_id, entry.subscription_id, &reason)?
                .is_some()
            {
                pipeline
                    .dal()
                    .webhook_subscriptions()
                    .record_failure(subscription.id)?;
            }
        }
        Some(subscription) if subscription.active => {
            pipeline
                .attempt(entry.delivery_id, &subscription, AttemptMode::Regular)
                .await?;
        }
        Some(_) => {
            pipeline.abandon(entry.delivery_id, entry.subscription_id, "subscription inactive")?;
        }
        None => {
            pipeline.abandon(entry.delivery_id, entry.subscription_id, "subscription deleted")?;
        }
    }
    Ok(())
}
