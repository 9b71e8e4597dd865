//! HTTP receiver for Univapay webhooks.
//!
//! # Architecture
//!
//! ```text
//! POST /webhooks/univapay ──> verify_and_parse ──> dedup ──> spawn_blocking(dispatch)
//!            │                      │                │                 │
//!            ▼                      ▼                ▼                 ▼
//!       raw Bytes +            400 + reason     200 duplicate     200 WebhookAck
//!        HeaderMap
//! ```
//!
//! Handler failures do not change the status code: they are counted in the
//! acknowledgement and in the metrics, and their messages stay server-side.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::error::Error;
use crate::handlers::status::{health_handler, metrics_handler};
use crate::metrics::WebhookMetrics;
use crate::webhook::{parse_event, MemoryIdempotencyStore, WebhookEvent, WebhookRouter};

/// Shared state of the receiver
#[derive(Debug)]
pub struct WebhookState {
    /// Verification settings and route
    pub config: WebhookConfig,
    /// Handlers, read-only after startup
    pub router: Arc<WebhookRouter>,
    /// Recently processed event ids
    pub dedup: MemoryIdempotencyStore,
    /// Receiver counters
    pub metrics: WebhookMetrics,
}

impl WebhookState {
    /// Build state from a configuration and a fully registered router
    pub fn new(config: WebhookConfig, router: WebhookRouter) -> Self {
        let dedup = MemoryIdempotencyStore::new(config.dedup_capacity);
        Self {
            config,
            router: Arc::new(router),
            dedup,
            metrics: WebhookMetrics::new(),
        }
    }
}

/// Acknowledgement body returned to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    /// `true` when every handler succeeded
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// RFC 3339 time the acknowledgement was produced
    pub timestamp: String,
    /// Unique id of this delivery attempt
    pub receipt_id: Uuid,
    /// Event id from the payload (may be empty)
    pub event_id: String,
    /// Event type from the payload
    pub event_type: String,
    /// Number of handlers run
    pub handlers: usize,
    /// Number of handlers that failed
    pub failures: usize,
    /// Delivery was a repeat of an already processed event id
    pub duplicate: bool,
}

impl WebhookAck {
    fn new(event: &WebhookEvent, message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            receipt_id: Uuid::new_v4(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            handlers: 0,
            failures: 0,
            duplicate: false,
        }
    }

    fn duplicate(event: &WebhookEvent) -> Self {
        Self {
            duplicate: true,
            ..Self::new(event, "Duplicate event ignored")
        }
    }
}

/// Webhook endpoint handler.
///
/// # Route
/// `POST {config.path}`
///
/// # Response
/// - `200 OK` with [`WebhookAck`] once dispatched, or for a duplicate
/// - `400 Bad Request` on verification or payload errors
/// - `500 Internal Server Error` when dispatch could not run
#[instrument(skip_all, fields(body_len = body.len()))]
pub async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    state.metrics.record_received();

    let event = match parse_event(&body, &headers, &state.config) {
        Ok(event) => event,
        Err(err) => {
            warn!(reason = err.reason(), error = %err, "Webhook rejected");
            state.metrics.record_rejected(err.reason());
            return err.into_response();
        }
    };

    if state.dedup.check_and_record(&event.id) {
        info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook ignored");
        state.metrics.record_duplicate();
        return (StatusCode::OK, Json(WebhookAck::duplicate(&event))).into_response();
    }

    let mut ack = WebhookAck::new(&event, "Webhook processed");
    let router = Arc::clone(&state.router);
    let event_type = event.event_type.clone();

    let outcomes = match tokio::task::spawn_blocking(move || router.dispatch(&event)).await {
        Ok(outcomes) => outcomes,
        Err(join_err) => {
            error!(event_id = %ack.event_id, error = %join_err, "Webhook dispatch task failed");
            state.dedup.forget(&ack.event_id);
            return Error::Dispatch(join_err.to_string()).into_response();
        }
    };

    ack.handlers = outcomes.len();
    ack.failures = outcomes.iter().filter(|o| !o.is_ok()).count();
    for outcome in &outcomes {
        let Some(failure) = outcome.failure() else {
            continue;
        };
        warn!(
            event_id = %ack.event_id,
            handler = %outcome.handler,
            kind = ?failure.kind,
            error = %failure.message,
            "Webhook handler failed"
        );
    }
    if ack.failures > 0 {
        ack.success = false;
        ack.message = "Webhook processed with handler failures".to_string();
    }

    state.metrics.record_handler_failures(ack.failures);
    state.metrics.record_accepted(&event_type, started.elapsed());
    info!(
        event_id = %ack.event_id,
        event_type = %ack.event_type,
        handlers = ack.handlers,
        failures = ack.failures,
        "Webhook processed"
    );

    (StatusCode::OK, Json(ack)).into_response()
}

/// Create the receiver router.
///
/// # Routes
/// - `POST {config.path}` - webhook endpoint
/// - `GET /health` - liveness probe
/// - `GET /metrics` - Prometheus text
pub fn webhook_routes(state: Arc<WebhookState>) -> Router {
    let path = route_path(&state.config.path);

    Router::new()
        .route(&path, post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn route_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
