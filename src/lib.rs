//! Univapay Webhooks - Signature Verification & Event Dispatch
//!
//! This crate provides the webhook side of a Univapay integration: it
//! authenticates incoming deliveries, decodes them into a permissive event
//! envelope, and dispatches them to registered handlers.
//!
//! # Features
//!
//! - **Signature Verification**: `t=..,v1=..`, `sha256=`, `sha1=` and bare hex
//!   headers, constant-time comparison, timestamp freshness window
//! - **Event Parsing**: every key of the body is kept; unknown event types are
//!   still delivered
//! - **Event Routing**: exact-type and `*` handlers with per-handler failure
//!   isolation
//! - **HTTP Receiver**: axum endpoint with deduplication and Prometheus metrics
//!
//! # Architecture
//!
//! ```text
//! Univapay ──▶ HTTP Receiver ──▶ Signature Verifier
//!                   │                    │
//!                   ▼                    ▼
//!            ┌────────────┐       ┌──────────────┐
//!            │   Dedup    │◀──────│ Event Parser │
//!            └─────┬──────┘       └──────────────┘
//!                  │
//!                  ▼
//!            Event Router ──▶ handlers (exact type, then `*`)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use univapay_webhooks::{verify_and_parse, WebhookConfig, WebhookRouter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = WebhookConfig::from_env()?;
//!     let mut router = WebhookRouter::new();
//!     router.on("subscription.payment.failed", |event| {
//!         println!("payment failed for {}", event.id);
//!         Ok(serde_json::Value::Null)
//!     })?;
//!
//!     let body = std::fs::read("webhook.json")?;
//!     let headers = [("X-Univapay-Signature", "t=1700000000,v1=...")];
//!     let (_info, event) = verify_and_parse(&body, &headers, &config)?;
//!     router.dispatch(&event);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod webhook;

// Re-exports for convenience
pub use config::WebhookConfig;
pub use error::{ConfigError, Error, FormatError, Result, VerificationError};
pub use handlers::{webhook_routes, WebhookAck, WebhookState};
pub use webhook::{
    parse_event, parse_unverified, sign_payload, verify_and_parse, verify_signature, EventHandler,
    EventKind, HandlerOutcome, SignatureInfo, SignatureScheme, SignatureVerifier, WebhookEvent,
    WebhookRouter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
