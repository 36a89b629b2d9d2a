/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for subscriptions and delivery records.
//!
//! `DAL` owns the in-memory state of both stores and hands out short-lived
//! accessor structs, one per store:
//!
//! ```rust,ignore
//! let dal = DAL::new(Arc::new(MemoryBackend::new()), 1000);
//! dal.load()?;
//! let active = dal.webhook_subscriptions().list(true)?;
//! ```
//!
//! Locks are std `RwLock`s and are never held across an `.await`.

use crate::error::{Result, WebhookError};
use cmo_models::models::{DeliveryRecord, WebhookSubscription};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

pub mod backend;
pub mod webhook_deliveries;
pub mod webhook_subscriptions;

pub use backend::{open_backend, FileBackend, KeyValueBackend, MemoryBackend};
pub use webhook_deliveries::WebhookDeliveriesDAL;
pub use webhook_subscriptions::WebhookSubscriptionsDAL;

/// Backend key holding the subscription list.
pub const SUBSCRIPTIONS_KEY: &str = "webhook-subscriptions";
/// Backend key holding the delivery history.
pub const DELIVERIES_KEY: &str = "webhook-deliveries";

/// The main Data Access Layer struct.
#[derive(Clone)]
pub struct DAL {
    backend: Arc<dyn KeyValueBackend>,
    subscriptions: Arc<RwLock<HashMap<Uuid, WebhookSubscription>>>,
    /// Delivery records in insertion order.
    deliveries: Arc<RwLock<Vec<DeliveryRecord>>>,
    max_delivery_history: usize,
}

impl DAL {
    /// Creates an empty DAL writing through to `backend`.
    ///
    /// Call [`DAL::load`] to pick up previously persisted state.
    pub fn new(backend: Arc<dyn KeyValueBackend>, max_delivery_history: usize) -> Self {
        DAL {
            backend,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            deliveries: Arc::new(RwLock::new(Vec::new())),
            max_delivery_history,
        }
    }

    /// Replaces the in-memory state with what the backend holds.
    pub fn load(&self) -> Result<()> {
        let subscriptions: Vec<WebhookSubscription> = match self.backend.load(SUBSCRIPTIONS_KEY)? {
            Some(doc) => serde_json::from_str(&doc)?,
            None => Vec::new(),
        };
        let deliveries: Vec<DeliveryRecord> = match self.backend.load(DELIVERIES_KEY)? {
            Some(doc) => serde_json::from_str(&doc)?,
            None => Vec::new(),
        };

        info!(
            "Loaded {} webhook subscriptions and {} delivery records",
            subscriptions.len(),
            deliveries.len()
        );

        *write_lock(&self.subscriptions)? = subscriptions.into_iter().map(|s| (s.id, s)).collect();
        *write_lock(&self.deliveries)? = deliveries;
        Ok(())
    }

    /// Provides access to the Webhook Subscriptions Data Access Layer.
    pub fn webhook_subscriptions(&self) -> WebhookSubscriptionsDAL<'_> {
        WebhookSubscriptionsDAL { dal: self }
    }

    /// Provides access to the Webhook Deliveries Data Access Layer.
    pub fn webhook_deliveries(&self) -> WebhookDeliveriesDAL<'_> {
        WebhookDeliveriesDAL { dal: self }
    }

    pub fn max_delivery_history(&self) -> usize {
        self.max_delivery_history
    }

    fn persist<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let doc = serde_json::to_string(value)?;
        self.backend.save(key, &doc)
    }

    /// Applies `f` to a copy of `store` and makes the copy live only once
    /// `save` has persisted it. On any error the live store is untouched.
    fn commit<T, R, F, S>(&self, store: &RwLock<T>, f: F, save: S) -> Result<R>
    where
        T: Clone,
        F: FnOnce(&mut T) -> Result<R>,
        S: FnOnce(&T) -> Result<()>,
    {
        let mut live = write_lock(store)?;
        let mut next = live.clone();
        let result = f(&mut next)?;
        save(&next)?;
        *live = next;
        Ok(result)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| WebhookError::Storage("store lock poisoned".to_string()))
}

fn write_lock<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| WebhookError::Storage("store lock poisoned".to_string()))
}
