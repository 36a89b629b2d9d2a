/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Lifecycle notices broadcast to in-process observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Default number of notices buffered per lagging receiver.
pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// Something observable happened to a subscription or delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookNotice {
    SubscriptionCreated {
        subscription_id: Uuid,
    },
    SubscriptionUpdated {
        subscription_id: Uuid,
    },
    SubscriptionDeleted {
        subscription_id: Uuid,
    },
    DeliverySucceeded {
        delivery_id: Uuid,
        subscription_id: Uuid,
        attempts: u32,
    },
    DeliveryRetryScheduled {
        delivery_id: Uuid,
        subscription_id: Uuid,
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    },
    DeliveryFailed {
        delivery_id: Uuid,
        subscription_id: Uuid,
        attempts: u32,
        error: Option<String>,
    },
}

/// Cloneable handle for publishing notices.
#[derive(Debug, Clone)]
pub struct NoticeSender {
    sender: broadcast::Sender<WebhookNotice>,
}

impl NoticeSender {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `notice`. Having no receivers is not an error.
    pub fn send(&self, notice: WebhookNotice) {
        if self.sender.send(notice).is_err() {
            trace!("Notice dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WebhookNotice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeSender {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}
