//! Event Routing
//!
//! Maps event-type patterns to handlers and dispatches a parsed event to every
//! match.
//!
//! # Dispatch order
//!
//! ```text
//! event.type == "charge.successful"
//!       |
//!       v
//! [handlers on "charge.successful", registration order]
//!       |
//!       v
//! [handlers on "*", registration order]
//! ```
//!
//! A handler that fails or panics is recorded as a failed [`HandlerOutcome`];
//! the remaining handlers still run.
//!
//! Registration takes `&mut self` and dispatch takes `&self`: build the router
//! at startup, then share it (e.g. in an `Arc`) for concurrent dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::webhook::events::{WebhookEvent, WILDCARD};

/// Value returned by a handler; captured into its [`HandlerOutcome`]
pub type HandlerResult = anyhow::Result<Value>;

/// A webhook event handler
pub trait EventHandler: Send + Sync {
    /// Label used in outcomes and logs
    fn name(&self) -> &str;

    /// Handle one event
    fn handle(&self, event: &WebhookEvent) -> HandlerResult;
}

/// Adapter turning a closure into an [`EventHandler`]
struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&WebhookEvent) -> HandlerResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        (self.func)(event)
    }
}

/// How a handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Handler returned an error
    Error,
    /// Handler panicked
    Panic,
}

/// Captured handler failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    /// Error or panic
    pub kind: FailureKind,
    /// Rendered error chain or panic message
    pub message: String,
}

/// Result of running one handler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerOutcome {
    /// Pattern the handler was registered under
    pub pattern: String,
    /// Handler name
    pub handler: String,
    /// Returned value, or the captured failure
    pub result: std::result::Result<Value, HandlerFailure>,
}

impl HandlerOutcome {
    /// Whether the handler completed without error
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// The failure, if any
    pub fn failure(&self) -> Option<&HandlerFailure> {
        self.result.as_ref().err()
    }
}

/// Registry of handlers keyed by exact event type or `*`
#[derive(Default)]
pub struct WebhookRouter {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    registered: usize,
}

impl fmt::Debug for WebhookRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (pattern, handlers) in &self.handlers {
            let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            map.entry(pattern, &names);
        }
        map.finish()
    }
}

impl WebhookRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for `pattern` (an exact event type or `*`)
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] for an empty pattern or a partial wildcard
    /// such as `charge.*`; only the universal `*` is supported.
    pub fn on<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&WebhookEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let name = format!("{}#{}", pattern.trim(), self.registered + 1);
        self.on_named(pattern, name, handler)
    }

    /// Register a closure with an explicit name
    pub fn on_named<F>(
        &mut self,
        pattern: &str,
        name: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&WebhookEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(
            pattern,
            FnHandler {
                name: name.into(),
                func: handler,
            },
        )
    }

    /// Register an [`EventHandler`] implementation
    pub fn register<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self>
    where
        H: EventHandler + 'static,
    {
        self.register_arc(pattern, Arc::new(handler))
    }

    /// Register a shared handler, e.g. one instance under several patterns
    pub fn register_arc(&mut self, pattern: &str, handler: Arc<dyn EventHandler>) -> Result<&mut Self> {
        let pattern = validate_pattern(pattern)?;
        debug!(pattern = %pattern, handler = handler.name(), "Webhook handler registered");
        self.handlers.entry(pattern).or_default().push(handler);
        self.registered += 1;
        Ok(self)
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        self.registered
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    /// Registered patterns, in no particular order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handlers that would run for `event_type`, in dispatch order
    pub fn handlers_for<'a>(
        &'a self,
        event_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn EventHandler>)> + 'a {
        let exact = if event_type.is_empty() || event_type == WILDCARD {
            None
        } else {
            self.handlers.get(event_type)
        };
        let exact = exact.into_iter().flatten().map(move |h| (event_type, h));
        let wildcard = self
            .handlers
            .get(WILDCARD)
            .into_iter()
            .flatten()
            .map(|h| (WILDCARD, h));
        exact.chain(wildcard)
    }

    /// Run every matching handler and collect one outcome per handler.
    ///
    /// Never fails because of a handler: errors and panics become failed
    /// outcomes and dispatch moves on.
    #[instrument(level = "debug", skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
    pub fn dispatch(&self, event: &WebhookEvent) -> Vec<HandlerOutcome> {
        let outcomes: Vec<HandlerOutcome> = self
            .handlers_for(&event.event_type)
            .map(|(pattern, handler)| run_handler(pattern, &**handler, event))
            .collect();

        debug!(
            handlers = outcomes.len(),
            failures = outcomes.iter().filter(|o| !o.is_ok()).count(),
            "Webhook event dispatched"
        );
        outcomes
    }
}

fn validate_pattern(pattern: &str) -> Result<String> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() || (trimmed.contains('*') && trimmed != WILDCARD) {
        return Err(Error::InvalidPattern(pattern.to_string()));
    }
    Ok(trimmed.to_string())
}

fn run_handler(pattern: &str, handler: &dyn EventHandler, event: &WebhookEvent) -> HandlerOutcome {
    let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(HandlerFailure {
            kind: FailureKind::Error,
            message: format!("{err:#}"),
        }),
        Err(payload) => Err(HandlerFailure {
            kind: FailureKind::Panic,
            message: panic_message(payload.as_ref()),
        }),
    };

    if let Err(failure) = &result {
        debug!(
            pattern,
            handler = handler.name(),
            kind = ?failure.kind,
            error = %failure.message,
            "Webhook handler failed"
        );
    }

    HandlerOutcome {
        pattern: pattern.to_string(),
        handler: handler.name().to_string(),
        result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Logging handler that logs all events
#[derive(Debug, Clone, Default)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            resource_type = %event.resource_type,
            mode = ?event.mode,
            verified = event.is_verified(),
            "Webhook event received"
        );
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::parser::parse_unverified;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn event(event_type: &str) -> WebhookEvent {
        let body = json!({"type": event_type, "id": "evt_1"}).to_string();
        parse_unverified(body.as_bytes()).unwrap()
    }

    /// Test handler that counts calls
    struct CountingHandler {
        calls: AtomicU32,
    }

    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        fn handle(&self, _event: &WebhookEvent) -> HandlerResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!(n))
        }
    }

    #[test]
    fn test_exact_then_wildcard_order() {
        let mut router = WebhookRouter::new();
        router
            .on_named("*", "audit", |_| Ok(json!("audit")))
            .unwrap()
            .on_named("charge.successful", "first", |_| Ok(json!("first")))
            .unwrap()
            .on_named("charge.successful", "second", |_| Ok(json!("second")))
            .unwrap()
            .on_named("charge.failed", "other", |_| Ok(json!("other")))
            .unwrap();

        let outcomes = router.dispatch(&event("charge.successful"));
        let names: Vec<&str> = outcomes.iter().map(|o| o.handler.as_str()).collect();
        assert_eq!(names, ["first", "second", "audit"]);
        assert_eq!(outcomes[2].pattern, "*");
        assert_eq!(outcomes[0].result, Ok(json!("first")));
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut router = WebhookRouter::new();
        router
            .on_named("a.b", "errors", |_| anyhow::bail!("database unavailable"))
            .unwrap()
            .on_named("a.b", "panics", |_| panic!("boom"))
            .unwrap()
            .on_named("*", "after", |e| Ok(json!(e.id)))
            .unwrap();

        let outcomes = router.dispatch(&event("a.b"));
        assert_eq!(outcomes.len(), 3);

        let err = outcomes[0].failure().unwrap();
        assert_eq!(err.kind, FailureKind::Error);
        assert!(err.message.contains("database unavailable"));

        let panicked = outcomes[1].failure().unwrap();
        assert_eq!(panicked.kind, FailureKind::Panic);
        assert_eq!(panicked.message, "boom");

        assert_eq!(outcomes[2].result, Ok(json!("evt_1")));
    }

    #[test]
    fn test_no_match_yields_no_outcomes() {
        let mut router = WebhookRouter::new();
        router.on("charge.successful", |_| Ok(Value::Null)).unwrap();
        assert!(router.dispatch(&event("refund.created")).is_empty());
    }

    #[test]
    fn test_empty_type_reaches_only_wildcard() {
        let mut router = WebhookRouter::new();
        router
            .on_named("", "never", |_| Ok(Value::Null))
            .unwrap_err();
        router.on_named("*", "all", |_| Ok(Value::Null)).unwrap();

        let mut ev = event("x.y");
        ev.event_type.clear();
        let names: Vec<&str> = router.handlers_for(&ev.event_type).map(|(_, h)| h.name()).collect();
        assert_eq!(names, ["all"]);
    }

    #[test]
    fn test_wildcard_type_does_not_run_twice() {
        let mut router = WebhookRouter::new();
        router.on("*", |_| Ok(Value::Null)).unwrap();
        assert_eq!(router.dispatch(&event("*")).len(), 1);
    }

    #[test]
    fn test_invalid_patterns() {
        let mut router = WebhookRouter::new();
        for pattern in ["", "   ", "charge.*", "**"] {
            let err = router.on(pattern, |_| Ok(Value::Null)).err().unwrap();
            assert!(matches!(err, Error::InvalidPattern(_)), "{pattern:?}");
        }
        assert!(router.is_empty());
    }

    #[test]
    fn test_shared_handler_under_two_patterns() {
        let shared: Arc<dyn EventHandler> = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
        });
        let mut router = WebhookRouter::new();
        router.register_arc("a.b", shared.clone()).unwrap();
        router.register_arc("*", shared).unwrap();

        let outcomes = router.dispatch(&event("a.b"));
        assert_eq!(outcomes[0].result, Ok(json!(1)));
        assert_eq!(outcomes[1].result, Ok(json!(2)));
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_default_names_and_patterns() {
        let mut router = WebhookRouter::new();
        router.on(" charge.created ", |_| Ok(Value::Null)).unwrap();
        router.register("*", LoggingHandler).unwrap();

        let mut patterns: Vec<&str> = router.patterns().collect();
        patterns.sort_unstable();
        assert_eq!(patterns, ["*", "charge.created"]);

        let outcomes = router.dispatch(&event("charge.created"));
        assert_eq!(outcomes[0].handler, "charge.created#1");
        assert_eq!(outcomes[1].handler, "logging");
        assert!(format!("{router:?}").contains("logging"));
    }

    #[test]
    fn test_router_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WebhookRouter>();
    }
}
