/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Shared fixtures for the integration suite.
//!
//! [`Receiver`] is a local HTTP endpoint standing in for a subscriber.
//! [`TestFixture`] builds a `WebhookService` with retry delays short enough
//! for tests.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use cmo_models::models::{EventType, NewWebhookSubscription, WebhookSubscription};
use cmo_utils::config::Settings;
use cmo_webhooks::api;
use cmo_webhooks::dal::{KeyValueBackend, MemoryBackend};
use cmo_webhooks::WebhookService;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A request as seen by the receiver.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Default)]
struct ReceiverState {
    hits: AtomicUsize,
    status: AtomicU16,
    delay_ms: AtomicU64,
    streamed: AtomicU64,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// Local webhook endpoint bound to `127.0.0.1:0`.
pub struct Receiver {
    url: String,
    state: Arc<ReceiverState>,
    handle: JoinHandle<()>,
}

impl Receiver {
    /// Starts a receiver answering every POST with `status`.
    pub async fn start(status: u16) -> Self {
        let state = Arc::new(ReceiverState::default());
        state.status.store(status, Ordering::SeqCst);

        let app = Router::new()
            .route("/hook", post(receive))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind receiver");
        let addr = listener.local_addr().expect("Receiver has no address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://{}/hook", addr),
            state,
            handle,
        }
    }

    /// Starts a receiver that sleeps `delay_ms` before answering.
    pub async fn slow(status: u16, delay_ms: u64) -> Self {
        let receiver = Self::start(status).await;
        receiver.state.delay_ms.store(delay_ms, Ordering::SeqCst);
        receiver
    }

    /// Starts a receiver that answers 200 and then streams a body that
    /// never ends. `streamed()` reports how many body bytes were written.
    pub async fn endless() -> Self {
        let state = Arc::new(ReceiverState::default());
        let app = Router::new()
            .route("/hook", post(stream_forever))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind receiver");
        let addr = listener.local_addr().expect("Receiver has no address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://{}/hook", addr),
            state,
            handle,
        }
    }

    pub fn streamed(&self) -> u64 {
        self.state.streamed.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn receive(
    State(state): State<Arc<ReceiverState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    state
        .requests
        .lock()
        .unwrap()
        .push(CapturedRequest { headers, body });
    state.hits.fetch_add(1, Ordering::SeqCst);

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "received")
}

const STREAM_CHUNK: usize = 64 * 1024;

async fn stream_forever(State(state): State<Arc<ReceiverState>>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let chunks = futures::stream::unfold(state, |state| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.streamed.fetch_add(STREAM_CHUNK as u64, Ordering::SeqCst);
        let chunk = Ok::<_, std::io::Error>(vec![b'x'; STREAM_CHUNK]);
        Some((chunk, state))
    });
    Response::new(Body::from_stream(chunks))
}

/// Settings with millisecond retry delays.
pub fn test_settings() -> Settings {
    let mut settings = Settings::new(None).expect("Failed to load default settings");
    settings.webhooks.retry_base_delay_ms = 10;
    settings.webhooks.retry_max_delay_ms = 40;
    settings.webhooks.default_timeout_ms = 2_000;
    settings.webhooks.probe_on_create = false;
    settings.webhooks.retry_client_errors = true;
    settings
}

pub struct TestFixture {
    pub service: WebhookService,
}

impl TestFixture {
    /// A service over a fresh in-memory backend.
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::with_backend(settings, Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(settings: Settings, backend: Arc<dyn KeyValueBackend>) -> Self {
        let service = WebhookService::new(&settings, backend).expect("Failed to build service");
        service.load().expect("Failed to load state");
        Self { service }
    }

    pub fn create_test_router(&self) -> Router {
        api::configure_api_routes().with_state(self.service.clone())
    }

    /// Registers `url` for `events` with the given retry budget.
    pub fn subscribe(
        &self,
        url: &str,
        events: Vec<EventType>,
        max_retries: u32,
    ) -> WebhookSubscription {
        self.service
            .create_subscription(
                NewWebhookSubscription::new(url, events).with_max_retries(max_retries),
            )
            .expect("Failed to create subscription")
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

/// Polls `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
