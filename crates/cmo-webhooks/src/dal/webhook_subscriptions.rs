/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for WebhookSubscription operations.
//!
//! Every mutation writes the full subscription list through to the backend
//! under the `webhook-subscriptions` key before it becomes visible. Concurrent
//! writers are serialized by the store lock, so the last writer wins.

use crate::dal::{read_lock, DAL, SUBSCRIPTIONS_KEY};
use crate::error::{Result, WebhookError};
use chrono::{DateTime, Utc};
use cmo_models::models::{EventType, UpdateWebhookSubscription, WebhookSubscription};
use std::collections::HashMap;
use uuid::Uuid;

/// Data Access Layer for WebhookSubscription operations.
pub struct WebhookSubscriptionsDAL<'a> {
    /// Reference to the main DAL instance.
    pub dal: &'a DAL,
}

impl WebhookSubscriptionsDAL<'_> {
    /// Stores a new subscription.
    ///
    /// # Arguments
    ///
    /// * `subscription` - A subscription built from a creation config.
    ///
    /// # Returns
    ///
    /// Returns the stored subscription, or a configuration error if it does
    /// not validate.
    pub fn create(&self, subscription: WebhookSubscription) -> Result<WebhookSubscription> {
        subscription.validate()?;

        self.commit(|subs| {
            subs.insert(subscription.id, subscription.clone());
            Ok(subscription)
        })
    }

    /// Gets a webhook subscription by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<WebhookSubscription>> {
        Ok(read_lock(&self.dal.subscriptions)?.get(&id).cloned())
    }

    /// Lists subscriptions, newest first.
    ///
    /// # Arguments
    ///
    /// * `active_only` - Skip inactive subscriptions when true.
    pub fn list(&self, active_only: bool) -> Result<Vec<WebhookSubscription>> {
        let subs = read_lock(&self.dal.subscriptions)?;
        let mut list: Vec<WebhookSubscription> = subs
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    /// Gets active subscriptions registered for `event_type`.
    ///
    /// Filters are not evaluated here; the dispatcher applies them against
    /// the event data.
    pub fn get_matching_subscriptions(&self, event_type: EventType) -> Result<Vec<WebhookSubscription>> {
        Ok(self
            .list(true)?
            .into_iter()
            .filter(|s| s.is_subscribed_to(event_type))
            .collect())
    }

    /// Applies a partial update.
    ///
    /// Returns `NotFound` without touching the store when `id` is unknown,
    /// and a configuration error when the patched record does not validate.
    pub fn update(&self, id: Uuid, update: &UpdateWebhookSubscription) -> Result<WebhookSubscription> {
        self.commit(|subs| {
            let current = subs
                .get(&id)
                .ok_or_else(|| WebhookError::subscription_not_found(id))?;
            let patched = current.patched(update)?;
            subs.insert(id, patched.clone());
            Ok(patched)
        })
    }

    /// Deletes a subscription.
    ///
    /// # Returns
    ///
    /// Returns true if a subscription was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        if self.get(id)?.is_none() {
            return Ok(false);
        }
        self.commit(|subs| Ok(subs.remove(&id).is_some()))
    }

    /// Activates or deactivates a subscription.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<WebhookSubscription> {
        self.update(
            id,
            &UpdateWebhookSubscription {
                active: Some(active),
                ..Default::default()
            },
        )
    }

    /// Bumps `success_count` and `last_triggered_at`.
    ///
    /// A subscription deleted in the meantime is ignored.
    pub fn record_success(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.bump(id, |sub| {
            sub.success_count += 1;
            sub.last_triggered_at = Some(at);
        })
    }

    /// Bumps `error_count`. A missing subscription is ignored.
    pub fn record_failure(&self, id: Uuid) -> Result<()> {
        self.bump(id, |sub| sub.error_count += 1)
    }

    fn bump<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut WebhookSubscription),
    {
        if self.get(id)?.is_none() {
            return Ok(());
        }
        self.commit(|subs| {
            if let Some(sub) = subs.get_mut(&id) {
                f(sub);
            }
            Ok(())
        })
    }

    fn commit<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut HashMap<Uuid, WebhookSubscription>) -> Result<R>,
    {
        self.dal.commit(&self.dal.subscriptions, f, |subs| {
            let mut list: Vec<&WebhookSubscription> = subs.values().collect();
            list.sort_by_key(|s| s.created_at);
            self.dal.persist(SUBSCRIPTIONS_KEY, &list)
        })
    }
}
