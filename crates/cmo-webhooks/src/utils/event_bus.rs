/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Event Bus for fire-and-forget event emission.
//!
//! Producers that should not wait for delivery push events into a bounded
//! mpsc channel. A background task drains it and hands each event to its own
//! dispatch task, so a slow subscriber of one event never holds up the next.
//! At most [`MAX_CONCURRENT_DISPATCHES`] events are in flight at once.

use crate::dispatcher::EventDispatcher;
use cmo_models::models::{EventSource, EventType};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

/// Default channel buffer size for events.
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Events dispatched concurrently before the loop stops draining the channel.
pub const MAX_CONCURRENT_DISPATCHES: usize = 64;

/// An event waiting to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub event_type: EventType,
    pub data: Value,
    pub source: EventSource,
}

impl BusEvent {
    pub fn new(event_type: EventType, data: Value, source: EventSource) -> Self {
        Self {
            event_type,
            data,
            source,
        }
    }
}

/// Front door for events that are dispatched in the background.
#[derive(Clone)]
pub struct EventBus {
    /// Sender for emitting events.
    sender: mpsc::Sender<BusEvent>,
}

impl EventBus {
    /// Creates a new event bus and starts its dispatch loop.
    ///
    /// # Arguments
    /// * `dispatcher` - Dispatcher receiving every emitted event.
    /// * `capacity` - The channel buffer size.
    pub fn start(dispatcher: EventDispatcher, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        start_event_loop(dispatcher, receiver);
        info!("Event bus started with capacity {}", capacity);
        Self { sender }
    }

    /// Emits an event to the bus.
    ///
    /// This is a non-blocking operation; a failed send is only logged.
    pub fn emit(&self, event: BusEvent) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let event_type = event.event_type;
            match sender.send(event).await {
                Ok(_) => debug!("Event emitted: {}", event_type),
                Err(e) => error!("Failed to emit event {}: channel closed - {}", event_type, e),
            }
        });
    }

    /// Emits an event, waiting for the channel to accept it.
    ///
    /// # Returns
    /// Ok if the event was accepted, Err if the dispatch loop has stopped.
    pub async fn emit_async(&self, event: BusEvent) -> Result<(), mpsc::error::SendError<BusEvent>> {
        let event_type = event.event_type;
        self.sender.send(event).await.map_err(|e| {
            error!("Failed to emit event {}: {}", event_type, e);
            e
        })?;
        debug!("Event emitted (async): {}", event_type);
        Ok(())
    }
}

fn start_event_loop(dispatcher: EventDispatcher, mut receiver: mpsc::Receiver<BusEvent>) {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_DISPATCHES));
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher
                    .trigger_event(event.event_type, event.data, event.source)
                    .await
                {
                    error!("Failed to dispatch event {}: {}", event.event_type, e);
                }
                drop(permit);
            });
        }
        warn!("Event bus stopped - channel closed");
    });
}
