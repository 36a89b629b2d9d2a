/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::api;
use crate::cli::DeliveryArgs;
use crate::dal::open_backend;
use crate::service::WebhookService;
use cmo_models::models::{EventSource, EventType};
use cmo_utils::config::Settings;
use cmo_utils::logging::prelude::*;
use serde::Serialize;
use tokio::signal;
use uuid::Uuid;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Opens the configured backend and loads the persisted state.
pub fn open_service(config: &Settings) -> Result<WebhookService, Box<dyn std::error::Error>> {
    let backend = open_backend(&config.storage)?;
    let service = WebhookService::new(config, backend)?;
    service.load()?;
    Ok(service)
}

/// Starts the webhook server.
///
/// Loads persisted state, starts background tasks, and serves the API until
/// ctrl+c is received.
pub async fn serve(config: &Settings) -> CommandResult {
    info!("Starting CMO webhook service");

    if !config.storage.is_persistent() {
        warn!("storage.path is empty, webhook state will not survive a restart");
    }
    let service = open_service(config)?;
    service.start_background_tasks();

    info!("Configuring API routes");
    let app = api::configure_api_routes().with_state(service.clone());

    let addr = &config.server.bind_address;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        shutdown_tx.send(()).ok();
    });

    info!("CMO webhook service is now running");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    service.shutdown();
    Ok(())
}

pub fn list_subscriptions(config: &Settings, active_only: bool) -> CommandResult {
    let service = open_service(config)?;
    let subscriptions: Vec<api::v1::WebhookResponse> = service
        .list_subscriptions(active_only)?
        .into_iter()
        .map(Into::into)
        .collect();
    print_json(&subscriptions)
}

pub fn list_deliveries(config: &Settings, args: &DeliveryArgs) -> CommandResult {
    let service = open_service(config)?;
    print_json(&service.list_deliveries(args.subscription, args.limit)?)
}

pub fn stats(config: &Settings, subscription: Option<Uuid>) -> CommandResult {
    let service = open_service(config)?;
    print_json(&service.get_stats(subscription)?)
}

/// Dispatches one event and waits for its first attempts.
///
/// Retries scheduled by those attempts are persisted and picked up by the
/// next `serve`.
pub async fn trigger(
    config: &Settings,
    event: EventType,
    data: &str,
    source: EventSource,
) -> CommandResult {
    let data: serde_json::Value = serde_json::from_str(data)?;
    let service = open_service(config)?;
    let summary = service.trigger_event(event, data, source).await?;
    service.shutdown();
    info!(
        "Event {} matched {} subscription(s)",
        summary.event_type, summary.matched
    );
    print_json(&summary)
}

pub async fn test(config: &Settings, id: Uuid) -> CommandResult {
    let service = open_service(config)?;
    let record = service.test_webhook(id).await?;
    service.shutdown();
    print_json(&record)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
