//! Univapay Webhook Module
//!
//! Receiving side of Univapay webhooks:
//!
//! - **Signature Verification**: HMAC-SHA256/SHA1 over the raw body, checked in
//!   constant time, with an optional timestamp freshness window
//! - **Event Parsing**: permissive envelope that keeps every key of the body
//! - **Event Routing**: exact-type and `*` handlers, failures isolated per handler
//! - **Idempotency**: bounded memory of recently seen event ids
//!
//! # Architecture
//!
//! ```text
//! raw body + headers -> Signature Verify -> Parse -> Router.dispatch
//!                              |              |              |
//!                              v              v              v
//!                      VerificationError  FormatError  Vec<HandlerOutcome>
//! ```
//!
//! # Security
//!
//! - Secrets come from the environment and are masked in `Debug` output
//! - Digest comparison is constant time
//! - The body is never decoded before its signature has been checked
//!
//! # Example
//!
//! ```rust,no_run
//! use univapay_webhooks::webhook::{verify_and_parse, WebhookRouter};
//! use univapay_webhooks::WebhookConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = WebhookConfig::from_env()?;
//!
//!     let mut router = WebhookRouter::new();
//!     router.on("charge.successful", |event| {
//!         println!("charge {} succeeded", event.id);
//!         Ok(serde_json::Value::Null)
//!     })?;
//!
//!     let body = br#"{"type":"charge.successful","id":"evt_1"}"#;
//!     let headers = [("X-Univapay-Signature", "sha256=...")];
//!     let (_info, event) = verify_and_parse(body, &headers, &config)?;
//!     for outcome in router.dispatch(&event) {
//!         println!("{} -> {:?}", outcome.handler, outcome.result);
//!     }
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod idempotency;
pub mod parser;
pub mod router;
pub mod signature;

// Re-export commonly used items
pub use events::{resource_type_of, EventKind, WebhookEvent, WILDCARD};
pub use idempotency::MemoryIdempotencyStore;
pub use parser::{parse_event, parse_unverified, verify_and_parse};
pub use router::{
    EventHandler, FailureKind, HandlerFailure, HandlerOutcome, HandlerResult, LoggingHandler,
    WebhookRouter,
};
pub use signature::{
    sign_payload, verify_signature, SignatureHeaders, SignatureInfo, SignatureScheme,
    SignatureVerifier, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADERS,
};
