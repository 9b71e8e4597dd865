//! HTTP handlers for the webhook receiver.

pub mod status;
pub mod webhook;

pub use status::{health_handler, metrics_handler, HealthResponse};
pub use webhook::{webhook_handler, webhook_routes, WebhookAck, WebhookState};
