/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Periodic maintenance tasks.

use crate::dal::DAL;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

/// Configuration for the delivery history cleanup task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookCleanupConfig {
    /// How often to run the cleanup (in seconds).
    pub interval_seconds: u64,
    /// Number of days to retain terminal deliveries.
    pub retention_days: i64,
}

impl Default for WebhookCleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // Every hour
            retention_days: 7,
        }
    }
}

/// Starts the delivery history cleanup task.
///
/// Terminal records created more than `retention_days` ago are deleted on
/// every tick. The first tick fires immediately.
pub fn start_webhook_cleanup_task(dal: DAL, config: WebhookCleanupConfig) -> JoinHandle<()> {
    info!(
        "Starting webhook cleanup task (interval: {}s, retention: {}d)",
        config.interval_seconds, config.retention_days
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_seconds.max(1)));

        loop {
            ticker.tick().await;

            match dal.webhook_deliveries().cleanup_old(config.retention_days) {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!(
                            "Cleaned up {} old webhook deliveries (age > {}d)",
                            deleted, config.retention_days
                        );
                    }
                }
                Err(e) => {
                    error!("Failed to cleanup old webhook deliveries: {}", e);
                }
            }
        }
    })
}
