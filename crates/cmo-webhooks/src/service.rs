/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! The webhook service facade.
//!
//! `WebhookService` wires the stores, the dispatcher, the retry scheduler
//! and the event bus together and is the type handed to the HTTP API and the
//! CLI. It is cheap to clone; all clones share the same state.
//!
//! ```rust,ignore
//! let settings = Settings::new(None)?;
//! let service = WebhookService::new(&settings, open_backend(&settings.storage)?)?;
//! service.load()?;
//! let summary = service
//!     .trigger_event(EventType::AlertCreated, json!({"priority": "critical"}), EventSource::Cmo)
//!     .await?;
//! ```

use crate::dal::{KeyValueBackend, DAL};
use crate::delivery::{BackoffPolicy, DeliveryExecutor, DeliveryPipeline, RetryScheduler};
use crate::dispatcher::{DispatchSummary, EventDispatcher};
use crate::error::{Result, WebhookError};
use crate::utils::background_tasks::{start_webhook_cleanup_task, WebhookCleanupConfig};
use crate::utils::event_bus::{BusEvent, EventBus};
use crate::utils::notifications::{NoticeSender, WebhookNotice, DEFAULT_NOTICE_CAPACITY};
use cmo_models::models::{
    DeliveryRecord, DeliveryStats, DeliveryStatus, EventSource, EventType,
    NewWebhookSubscription, UpdateWebhookSubscription, WebhookSubscription,
};
use cmo_utils::config::{Settings, Webhooks};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Entry point to every webhook operation.
#[derive(Clone)]
pub struct WebhookService {
    inner: Arc<Inner>,
}

struct Inner {
    config: Webhooks,
    dal: DAL,
    dispatcher: EventDispatcher,
    scheduler: RetryScheduler,
    notices: NoticeSender,
    bus: EventBus,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookService {
    /// Builds the service and starts the retry worker and event bus.
    ///
    /// Must be called within a Tokio runtime. Persisted state is not read
    /// until [`WebhookService::load`] is called.
    pub fn new(settings: &Settings, backend: Arc<dyn KeyValueBackend>) -> Result<Self> {
        let config = settings.webhooks.clone();
        if config.default_timeout_ms == 0 {
            return Err(WebhookError::Configuration(
                "webhooks.default_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let dal = DAL::new(backend, settings.storage.max_delivery_history);
        let notices = NoticeSender::new(DEFAULT_NOTICE_CAPACITY);
        let executor = DeliveryExecutor::new(config.user_agent.clone(), config.response_excerpt_limit)?;
        let pipeline = DeliveryPipeline::new(
            dal.clone(),
            executor,
            notices.clone(),
            BackoffPolicy::new(config.retry_base_delay_ms, config.retry_max_delay_ms),
            config.retry_client_errors,
        );

        let dispatcher = EventDispatcher::new(pipeline.clone());
        let scheduler = RetryScheduler::start(pipeline);
        let bus = EventBus::start(dispatcher.clone(), config.event_channel_size);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                dal,
                dispatcher,
                scheduler,
                notices,
                bus,
                cleanup: Mutex::new(None),
            }),
        })
    }

    /// Loads persisted state and requeues deliveries that were still open.
    pub fn load(&self) -> Result<()> {
        self.inner.dal.load()?;

        let open: Vec<DeliveryRecord> = self
            .inner
            .dal
            .webhook_deliveries()
            .list(None, None)?
            .into_iter()
            .rev()
            .filter(|r| !r.is_terminal())
            .collect();
        for record in &open {
            self.inner.scheduler.enqueue(record.id, record.subscription_id);
        }
        if !open.is_empty() {
            info!("Requeued {} open deliveries", open.len());
        }
        Ok(())
    }

    /// Starts the delivery history cleanup task. Calling it again is a no-op.
    pub fn start_background_tasks(&self) {
        let mut cleanup = self.inner.cleanup.lock().unwrap_or_else(|e| e.into_inner());
        if cleanup.is_none() {
            *cleanup = Some(start_webhook_cleanup_task(
                self.inner.dal.clone(),
                WebhookCleanupConfig {
                    interval_seconds: self.inner.config.cleanup_interval_seconds,
                    retention_days: self.inner.config.retention_days,
                },
            ));
        }
    }

    pub fn dal(&self) -> &DAL {
        &self.inner.dal
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Creates a subscription.
    ///
    /// Retry budget and timeout default to the configured values. A target
    /// URL that does not parse is only logged. With `probe_on_create` set, a
    /// test delivery is sent in the background.
    pub fn create_subscription(&self, new: NewWebhookSubscription) -> Result<WebhookSubscription> {
        let subscription = new.into_subscription(
            self.inner.config.default_max_retries,
            self.inner.config.default_timeout_ms,
        )?;
        if !subscription.has_valid_url() {
            warn!(
                "Subscription {} has an invalid target URL: {}",
                subscription.id, subscription.target_url
            );
        }

        let subscription = self.inner.dal.webhook_subscriptions().create(subscription)?;
        info!(
            "Created webhook subscription {} ({}) for {} event type(s)",
            subscription.id,
            subscription.name,
            subscription.subscribed_events.len()
        );
        self.inner.notices.send(WebhookNotice::SubscriptionCreated {
            subscription_id: subscription.id,
        });

        if self.inner.config.probe_on_create {
            let dispatcher = self.inner.dispatcher.clone();
            let id = subscription.id;
            tokio::spawn(async move {
                match dispatcher.test_webhook(id).await {
                    Ok(record) if record.status == DeliveryStatus::Failed => {
                        warn!(
                            "Connectivity probe for subscription {} failed: {}",
                            id,
                            record.error_message.as_deref().unwrap_or_default()
                        );
                    }
                    Ok(_) => info!("Connectivity probe for subscription {} succeeded", id),
                    Err(e) => error!("Connectivity probe for subscription {} errored: {}", id, e),
                }
            });
        }

        Ok(subscription)
    }

    /// Applies a partial update to a subscription.
    pub fn update_subscription(
        &self,
        id: Uuid,
        update: &UpdateWebhookSubscription,
    ) -> Result<WebhookSubscription> {
        let subscription = self.inner.dal.webhook_subscriptions().update(id, update)?;
        if update.target_url.is_some() && !subscription.has_valid_url() {
            warn!(
                "Subscription {} has an invalid target URL: {}",
                subscription.id, subscription.target_url
            );
        }
        info!("Updated webhook subscription {}", id);
        self.inner
            .notices
            .send(WebhookNotice::SubscriptionUpdated { subscription_id: id });
        Ok(subscription)
    }

    /// Deletes a subscription and cancels its pending retries.
    ///
    /// Delivery records are kept. Returns false if the id was unknown.
    pub fn delete_subscription(&self, id: Uuid) -> Result<bool> {
        if !self.inner.dal.webhook_subscriptions().delete(id)? {
            return Ok(false);
        }
        self.inner.scheduler.cancel_subscription(id)?;
        info!("Deleted webhook subscription {}", id);
        self.inner
            .notices
            .send(WebhookNotice::SubscriptionDeleted { subscription_id: id });
        Ok(true)
    }

    pub fn get_subscription(&self, id: Uuid) -> Result<Option<WebhookSubscription>> {
        self.inner.dal.webhook_subscriptions().get(id)
    }

    pub fn list_subscriptions(&self, active_only: bool) -> Result<Vec<WebhookSubscription>> {
        self.inner.dal.webhook_subscriptions().list(active_only)
    }

    pub fn set_active(&self, id: Uuid, active: bool) -> Result<WebhookSubscription> {
        self.update_subscription(
            id,
            &UpdateWebhookSubscription {
                active: Some(active),
                ..Default::default()
            },
        )
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Delivers an event to every matching subscription and waits for the
    /// first attempts.
    pub async fn trigger_event(
        &self,
        event_type: EventType,
        data: Value,
        source: EventSource,
    ) -> Result<DispatchSummary> {
        self.inner
            .dispatcher
            .trigger_event(event_type, data, source)
            .await
    }

    /// Queues an event for background dispatch without waiting.
    pub fn emit(&self, event_type: EventType, data: Value, source: EventSource) {
        self.inner.bus.emit(BusEvent::new(event_type, data, source));
    }

    /// Queues an event, waiting until the bus accepts it.
    pub async fn emit_async(&self, event_type: EventType, data: Value, source: EventSource) -> Result<()> {
        self.inner
            .bus
            .emit_async(BusEvent::new(event_type, data, source))
            .await
            .map_err(|_| WebhookError::InvalidState("event bus is closed".to_string()))
    }

    /// Sends a single test delivery to a subscription.
    pub async fn test_webhook(&self, id: Uuid) -> Result<DeliveryRecord> {
        self.inner.dispatcher.test_webhook(id).await
    }

    // ------------------------------------------------------------------
    // Deliveries
    // ------------------------------------------------------------------

    /// Lists delivery records, most recent first.
    pub fn list_deliveries(
        &self,
        subscription_id: Option<Uuid>,
        limit: Option<usize>,
    ) -> Result<Vec<DeliveryRecord>> {
        self.inner
            .dal
            .webhook_deliveries()
            .list(subscription_id, limit)
    }

    pub fn get_delivery(&self, id: Uuid) -> Result<Option<DeliveryRecord>> {
        self.inner.dal.webhook_deliveries().get(id)
    }

    /// Redelivers a failed delivery as a new record.
    pub async fn retry_delivery(&self, id: Uuid) -> Result<DeliveryRecord> {
        self.inner.dispatcher.redeliver(id).await
    }

    pub fn get_stats(&self, subscription_id: Option<Uuid>) -> Result<DeliveryStats> {
        self.inner.dal.webhook_deliveries().get_stats(subscription_id)
    }

    /// Removes terminal records older than `retention_days`, or the
    /// configured retention when `None`.
    pub fn cleanup_deliveries(&self, retention_days: Option<i64>) -> Result<usize> {
        let days = retention_days.unwrap_or(self.inner.config.retention_days);
        let removed = self.inner.dal.webhook_deliveries().cleanup_old(days)?;
        info!("Removed {} delivery records older than {}d", removed, days);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn subscribe_notices(&self) -> broadcast::Receiver<WebhookNotice> {
        self.inner.notices.subscribe()
    }

    pub fn retry_queue_len(&self) -> usize {
        self.inner.scheduler.queue_len()
    }

    /// Stops the retry worker and background tasks.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        let cleanup = self
            .inner
            .cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = cleanup {
            handle.abort();
        }
        info!("Webhook service stopped");
    }
}
